//! Certificate management for Synology DSM appliances.
//!
//! List, set as default, delete, upload and export certificates, and bind a
//! certificate to a DSM system service, over an authenticated DSM web API
//! session supplied through [`transport::Transport`].

pub mod binding;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod session;
pub mod transfer;
pub mod transport;

pub use binding::{BindOutcome, DuplicatePolicy, ServiceBinder, DEFAULT_SERVICE};
pub use error::{CertError, Result};
pub use model::{ApiReply, Certificate, ServiceBinding};
pub use registry::{CertIds, CertificateRegistry};
pub use session::HttpSession;
pub use transfer::{CertificateTransfer, ExportOutcome, UploadRequest};
pub use transport::Transport;
