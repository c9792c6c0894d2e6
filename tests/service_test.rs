//! Kiosk service flows against mocked collaborators.
//!
//! The gateway and the settings store are injected interfaces, so the full
//! scan/reconcile flows run here without any HTTP server or database.

use async_trait::async_trait;
use mockall::mock;

use toolkit_kiosk::config::RecognitionConfig;
use toolkit_kiosk::error::{
    ComparisonApiResult, ComparisonError, RecognitionError, RecognitionResult, StorageResult,
};
use toolkit_kiosk::reconcile::{compare, ComparisonResult, ReturnedTool, ToolKey};
use toolkit_kiosk::recognition::{ImageUpload, RecognitionGateway};
use toolkit_kiosk::session::{DetectedTool, ReturnSession, ScanResult, SessionPhase};
use toolkit_kiosk::settings::{Confidence, SettingsStore};
use toolkit_kiosk::toolkit::{standard_issued_kit, ToolId};
use toolkit_kiosk::KioskService;

mock! {
    pub Gateway {}

    #[async_trait]
    impl RecognitionGateway for Gateway {
        async fn recognize(
            &self,
            image: ImageUpload,
            toolkit_id: ToolId,
            confidence: Confidence,
        ) -> RecognitionResult<ScanResult>;

        async fn compare_with_issued(
            &self,
            user_id: i64,
            toolkit_id: ToolId,
            returned: Vec<ReturnedTool>,
        ) -> ComparisonApiResult<ComparisonResult>;
    }
}

mock! {
    pub Settings {}

    #[async_trait]
    impl SettingsStore for Settings {
        async fn confidence(&self) -> StorageResult<Confidence>;
        async fn set_confidence(&self, value: Confidence) -> StorageResult<()>;
    }
}

fn scan_of(ids: &[i64]) -> ScanResult {
    let detections = ids
        .iter()
        .map(|id| {
            let record = toolkit_kiosk::toolkit::find_by_id(*id).expect("kit tool");
            DetectedTool::recognized(
                ToolKey::Canonical(record.id),
                record.name,
                Some(record.serial_number),
                record.category,
                0.9,
                1,
            )
        })
        .collect();
    ScanResult {
        detections,
        hand_check: ids.len() != 11,
        processed_image_url: None,
        ml_predictions: Vec::new(),
    }
}

fn default_settings() -> MockSettings {
    let mut settings = MockSettings::new();
    settings
        .expect_confidence()
        .returning(|| Ok(Confidence::default()));
    settings
}

fn photo(name: &str) -> ImageUpload {
    ImageUpload::jpeg(name, vec![0xFF, 0xD8])
}

#[tokio::test]
async fn scan_then_reconcile_reports_the_kept_out_tool() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .times(1)
        .returning(|_, _, _| Ok(scan_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])));

    let service = KioskService::new(gateway, default_settings(), RecognitionConfig::default());
    let mut session = ReturnSession::new();

    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("scan flow"));
    assert_eq!(session.total_detected(), 10);
    assert!(session.hand_check_recommended());

    let report = service.reconcile(&mut session).expect("reconcile");
    assert!(!report.all_returned);
    assert_eq!(report.missing_tools.len(), 1);
    assert_eq!(report.missing_tools[0].tool_id, 11);
    assert_eq!(report.missing_tools[0].name, "Бокорезы");
    assert_eq!(report.missing_tools[0].missing_quantity, 1);
    assert_eq!(report.extra_tools, vec![]);
    assert_eq!(report.comparison_summary.total_issued, 11);
    assert_eq!(report.comparison_summary.total_returned, 10);
    assert_eq!(report.comparison_summary.missing_count, 1);
    assert_eq!(report.comparison_summary.extra_count, 0);
    assert_eq!(session.phase(), SessionPhase::Reconciled);
}

#[tokio::test]
async fn recognition_failure_surfaces_an_error_and_keeps_the_session_usable() {
    let mut gateway = MockGateway::new();
    gateway.expect_recognize().times(1).returning(|_, _, _| {
        Err(RecognitionError::Api {
            status: 500,
            message: "inference crashed".to_string(),
        })
    });
    gateway
        .expect_recognize()
        .times(1)
        .returning(|_, _, _| Ok(scan_of(&[1])));

    let service = KioskService::new(gateway, default_settings(), RecognitionConfig::default());
    let mut session = ReturnSession::new();

    let attached = service
        .scan_image(&mut session, photo("bad.jpg"))
        .await
        .expect("flow must not propagate the recognition error");
    assert!(!attached);
    assert_eq!(session.phase(), SessionPhase::Empty);
    assert_eq!(session.total_detected(), 0);
    assert!(session.last_error().expect("error recorded").contains("500"));

    // The session stays usable: the next photo scans normally
    assert!(service
        .scan_image(&mut session, photo("good.jpg"))
        .await
        .expect("second scan"));
    assert_eq!(session.phase(), SessionPhase::Scanned);
    assert_eq!(session.total_detected(), 1);
}

#[tokio::test]
async fn duplicate_file_name_never_reaches_the_gateway() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .times(1)
        .returning(|_, _, _| Ok(scan_of(&[1])));

    let service = KioskService::new(gateway, default_settings(), RecognitionConfig::default());
    let mut session = ReturnSession::new();

    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("first scan"));
    assert!(!service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("duplicate is a no-op"));
    assert_eq!(session.images().len(), 1);
}

#[tokio::test]
async fn stored_threshold_is_passed_to_the_gateway() {
    let mut settings = MockSettings::new();
    settings
        .expect_confidence()
        .returning(|| Ok(Confidence::new(0.25).expect("valid")));

    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .withf(|image, toolkit_id, confidence| {
            image.file_name == "tray.jpg" && *toolkit_id == 1 && confidence.value() == 0.25
        })
        .times(1)
        .returning(|_, _, _| Ok(scan_of(&[1])));

    let service = KioskService::new(gateway, settings, RecognitionConfig::default());
    let mut session = ReturnSession::new();
    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("scan"));
}

#[tokio::test]
async fn remote_comparison_failure_is_best_effort() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .returning(|_, _, _| Ok(scan_of(&[1, 2])));
    gateway.expect_compare_with_issued().returning(|_, _, _| {
        Err(ComparisonError::Api {
            status: 404,
            message: "no issuance found".to_string(),
        })
    });

    let config = RecognitionConfig {
        remote_compare: true,
        ..RecognitionConfig::default()
    };
    let service = KioskService::new(gateway, default_settings(), config);
    let mut session = ReturnSession::new();

    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("scan"));

    let report = service
        .request_comparison(&mut session)
        .await
        .expect("comparison failure must not propagate");
    assert!(report.is_none());

    // Raw returned tools stay available without a discrepancy report
    assert!(session.comparison().is_none());
    assert_eq!(session.phase(), SessionPhase::Scanned);
    assert_eq!(session.total_detected(), 2);
    assert!(session.last_error().expect("error recorded").contains("404"));
}

#[tokio::test]
async fn remote_comparison_success_attaches_the_report() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .returning(|_, _, _| Ok(scan_of(&[1, 2])));
    gateway
        .expect_compare_with_issued()
        .withf(|user_id, toolkit_id, returned| {
            *user_id == 1 && *toolkit_id == 1 && returned.len() == 2
        })
        .times(1)
        .returning(|_, _, returned| Ok(compare(&standard_issued_kit(), &returned)));

    let config = RecognitionConfig {
        remote_compare: true,
        ..RecognitionConfig::default()
    };
    let service = KioskService::new(gateway, default_settings(), config);
    let mut session = ReturnSession::new();

    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("scan"));

    let report = service
        .request_comparison(&mut session)
        .await
        .expect("comparison")
        .expect("report attached");
    assert!(!report.all_returned);
    assert_eq!(report.comparison_summary.total_returned, 2);
    assert_eq!(session.phase(), SessionPhase::Reconciled);
}

#[tokio::test]
async fn set_confidence_validates_before_persisting() {
    let mut settings = MockSettings::new();
    settings
        .expect_set_confidence()
        .withf(|value| value.value() == 0.35)
        .times(1)
        .returning(|_| Ok(()));

    let service = KioskService::new(
        MockGateway::new(),
        settings,
        RecognitionConfig::default(),
    );

    // Out-of-range values never reach the store
    assert!(service.set_confidence(0.0).await.is_err());
    assert!(service.set_confidence(1.0).await.is_err());
    assert!(service.set_confidence(-0.1).await.is_err());
    assert!(service.set_confidence(1.5).await.is_err());

    let stored = service.set_confidence(0.35).await.expect("valid threshold");
    assert_eq!(stored.value(), 0.35);
}

#[tokio::test]
async fn manual_corrections_flow_into_the_comparison() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_recognize()
        .returning(|_, _, _| Ok(scan_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])));

    let service = KioskService::new(gateway, default_settings(), RecognitionConfig::default());
    let mut session = ReturnSession::new();

    assert!(service
        .scan_image(&mut session, photo("tray.jpg"))
        .await
        .expect("scan"));

    // The operator adds the missing tool by hand
    session.add_manual_tool("Бокорезы", 1).expect("manual add");

    let report = service.reconcile(&mut session).expect("reconcile");
    assert!(report.all_returned);
    assert_eq!(report.missing_tools, vec![]);
    assert_eq!(report.comparison_summary.total_returned, 11);
}
