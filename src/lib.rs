//! # Toolkit Kiosk
//!
//! Core library for a tool check-out/check-in kiosk: operators photograph a
//! tray of hand tools, the photos go to an external ML recognition service,
//! and the detected tool list is reviewed, corrected, and reconciled against
//! the issued reference toolkit.
//!
//! ## Features
//!
//! - **Recognition Gateway**: typed multipart client for the detection
//!   endpoint with retries and boundary validation
//! - **Per-Image Aggregation**: multi-photo sessions with manual additions,
//!   removals, and quantity edits; the aggregate is always derived state
//! - **Reconciliation Engine**: pure comparison of returned vs. issued
//!   quantities producing missing/extra/discrepancy reports
//! - **Confidence Setting**: validated detection threshold persisted in
//!   SQLite with last-writer-wins semantics
//! - **Session State Machine**: `Empty → Uploading → Scanned → Reconciled`
//!   with late-result discards and comparison invalidation
//!
//! ## Architecture
//!
//! ```text
//! Kiosk UI → KioskService (Rust) → Recognition service (HTTP)
//!                  ↓
//!          ReturnSession (state) → Reconciliation engine
//!                  ↓
//!            SQLite (settings)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use toolkit_kiosk::{Config, KioskService, ReturnSession};
//! use toolkit_kiosk::recognition::{ImageUpload, RecognitionClient};
//! use toolkit_kiosk::settings::SqliteSettings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let settings = SqliteSettings::new(&config.database).await?;
//!     let gateway = RecognitionClient::new(&config.recognition, config.request.clone())?;
//!     let service = KioskService::new(gateway, settings, config.recognition.clone());
//!
//!     let mut session = ReturnSession::new();
//!     let photo = ImageUpload::jpeg("tray.jpg", std::fs::read("tray.jpg")?);
//!     service.scan_image(&mut session, photo).await?;
//!     let report = service.reconcile(&mut session)?;
//!     println!("complete return: {}", report.all_returned);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for the kiosk.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// The reconciliation engine comparing returned against issued tools.
pub mod reconcile;
/// Gateway to the external recognition service.
pub mod recognition;
/// Kiosk orchestration over gateway, settings, and session state.
pub mod service;
/// Per-session state: images, detections, and the aggregate list.
pub mod session;
/// The persisted confidence threshold.
pub mod settings;
/// The canonical reference toolkit.
pub mod toolkit;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use reconcile::{compare, ComparisonResult};
pub use service::KioskService;
pub use session::{ReturnSession, SessionPhase};
pub use settings::Confidence;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for an embedding application.
///
/// Respects `RUST_LOG` when set, falling back to the configured level.
pub fn init_logging(config: &config::LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
