pub mod bootstrap;
pub mod connector;
pub mod orchestrator;
pub mod picker;
pub mod session;
pub mod sync;
pub mod token;

pub use connector::{ConnectorAuthManager, ConnectorError, ConnectorEvent, ConnectorSdk};
pub use orchestrator::{FlowOutcome, IntegrationOrchestrator, IntegrationState, Phase};
pub use picker::{FolderPickerManager, PickerError, PickerOutcome, SelectedFolder};
pub use session::SessionContext;
pub use sync::{SyncState, SyncStatus, SyncStatusPoller};
pub use token::{TokenError, TokenProvider, TokenSource};
