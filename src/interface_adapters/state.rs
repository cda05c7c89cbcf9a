use std::sync::Arc;

use crate::interface_adapters::clients::{AccountsPageClient, BackendClient};
use crate::interface_adapters::clock::SystemClock;
use crate::interface_adapters::host::{
    BrowserApi, CallbackHandle, HostHandle, InProcessHost, Promisified,
};
use crate::interface_adapters::views::TracingView;
use crate::use_cases::{ClaimUiController, Coordinator, DetectionAgent};

pub type HostApi = BrowserApi<HostHandle>;
// Content scripts only get the callback flavour of the host API.
pub type CallbackApi = BrowserApi<Promisified<CallbackHandle>>;

pub type BackgroundCoordinator = Coordinator<BackendClient<HostApi>, HostApi, HostApi>;
pub type PopupController = ClaimUiController<HostApi, HostApi, HostApi, TracingView>;
pub type PageAgent =
    DetectionAgent<CallbackApi, AccountsPageClient<HostApi>, TracingView, SystemClock>;

#[derive(Clone)]
pub struct AppState {
    // Message bus, storage, tabs and cookies shared by every context.
    pub host: InProcessHost,
    // Background context.
    pub coordinator: Arc<BackgroundCoordinator>,
    // Popup context; lives until the popup is closed.
    pub popup: Arc<PopupController>,
    // Content script injected into the profiles tab.
    pub page: Arc<PageAgent>,
}
