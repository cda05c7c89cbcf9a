// Framework bootstrap: wires the background, popup and page contexts onto one host.

use crate::frameworks::config::{self, ExtensionSettings};
use crate::interface_adapters::clients::{AccountsPageClient, BackendClient};
use crate::interface_adapters::clock::SystemClock;
use crate::interface_adapters::host::{BrowserApi, ContextKind, InProcessHost, Promisified};
use crate::interface_adapters::listener::RuntimeListener;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::views::TracingView;
use crate::use_cases::{ClaimUiController, Coordinator, DetectionAgent, SessionStore};

use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

/// Run the extension until Ctrl-C, then close the popup.
pub async fn run(state: AppState) -> Result<()> {
    // Startup check, as on install.
    state.coordinator.revalidate_session().await;
    state.popup.open().await;

    tracing::info!("extension running; press Ctrl-C to close the popup.");
    tokio::signal::ctrl_c().await.inspect_err(|e| {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    })?;

    state.popup.close().await;
    state.host.unload(ContextKind::Popup);
    tracing::info!("popup closed.");
    Ok(())
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();
    let state = build_state().await?;
    run(state).await
}

async fn build_state() -> Result<AppState> {
    let host = match config::storage_path() {
        Some(path) => InProcessHost::with_storage_file(&path).await.map_err(|e| {
            std::io::Error::other(format!("failed to open storage {}: {e}", path.display()))
        })?,
        None => InProcessHost::new(),
    };

    let cookies = config::seed_cookies();
    tracing::debug!(count = cookies.len(), "seeding cookies");
    host.add_cookies(cookies);

    assemble(host, config::extension_settings())
}

/// Attach every context to `host` and register their listeners.
///
/// The profiles page is opened in a new tab so the page agent has a tab to live in.
pub fn assemble(host: InProcessHost, settings: ExtensionSettings) -> Result<AppState> {
    // Background
    let background = BrowserApi::new(host.handle(ContextKind::Background));
    let backend = BackendClient::new(
        settings.api_base_url.clone(),
        settings.cookie_domain.clone(),
        settings.api_timeout,
        background.clone(),
    )
    .map_err(|e| std::io::Error::other(format!("failed to initialize backend client: {e}")))?;
    tracing::debug!(
        api_base_url = %settings.api_base_url,
        api_timeout_ms = settings.api_timeout.as_millis(),
        "backend client configured"
    );
    let coordinator = Arc::new(Coordinator::new(
        backend,
        SessionStore::new(background.clone()),
        background.clone(),
    ));
    background.add_listener(Arc::new(
        RuntimeListener::new("background", Arc::clone(&coordinator)).answering_invalid(),
    ));

    // Page
    let tab = host.open_tab(&settings.claim_ui.profiles_url);
    let page_url = tab.url.clone().unwrap_or_default();
    let page_handle = host.handle(ContextKind::Page(tab.id));
    let page_fetch = AccountsPageClient::new(settings.api_timeout, BrowserApi::new(page_handle.clone()))
        .map_err(|e| std::io::Error::other(format!("failed to initialize page client: {e}")))?;
    let page_api = BrowserApi::new(Promisified::new(page_handle.callback_style()));
    let page = Arc::new(DetectionAgent::new(
        settings.detection.clone(),
        page_url,
        page_api.clone(),
        page_fetch,
        Arc::new(TracingView),
        SystemClock,
    ));
    page_api.add_listener(Arc::new(RuntimeListener::new("page", Arc::clone(&page))));
    tracing::debug!(tab_id = tab.id, "page agent attached");

    // Popup
    let popup_api = BrowserApi::new(host.handle(ContextKind::Popup));
    let popup = ClaimUiController::new(
        settings.claim_ui.clone(),
        popup_api.clone(),
        popup_api.clone(),
        SessionStore::new(popup_api.clone()),
        TracingView,
    );
    popup_api.add_listener(Arc::new(RuntimeListener::new("popup", Arc::clone(&popup))));

    Ok(AppState {
        host,
        coordinator,
        popup,
        page,
    })
}
