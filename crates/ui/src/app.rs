use std::path::PathBuf;
use std::sync::Arc;

use ferrer_platform::{Platform, PlatformError, SupabaseConfig, create_platform};
use ferrer_storage::{KeyValueStore, MemoryKeyValueStore, SqliteStorage, StorageError};
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{ActiveTheme, label::Label, v_flex};
use gpui_tokio_bridge::Tokio;
use snafu::{ResultExt, Snafu};

use crate::callback::CallbackView;
use crate::chat::ChatView;
use crate::config::{AppConfig, ConfigError};
use crate::routes::{Navigate, Route};
use crate::sign_in::SignInView;

pub const APP_TITLE: &str = "Chat del Evento Ferrer";
pub const STARTING_LABEL: &str = "Cargando…";
pub const STARTUP_FAILED_LABEL: &str = "No se pudo iniciar la aplicación.";

#[cfg(target_os = "macos")]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 78.0;
#[cfg(not(target_os = "macos"))]
const WINDOW_TOOLBAR_LEFT_SAFE_PADDING: f32 = 16.0;

gpui::actions!(shell, [Quit]);

fn window_toolbar_height(window: &Window) -> Pixels {
    (1.75 * window.rem_size()).max(px(34.0))
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StartupError {
    #[snafu(display("{source}"))]
    Config {
        stage: &'static str,
        source: ConfigError,
    },
    #[snafu(display("{source}"))]
    AuthStorage {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("{source}"))]
    Platform {
        stage: &'static str,
        source: PlatformError,
    },
    #[snafu(display("startup task stopped early on `{stage}`: {details}"))]
    Interrupted {
        stage: &'static str,
        details: String,
    },
}

/// Opens auth storage and builds the hosted adapters.
pub async fn open_platform(
    supabase: SupabaseConfig,
    persist_session: bool,
    database_path: PathBuf,
) -> Result<Platform, StartupError> {
    let storage: Arc<dyn KeyValueStore> = if persist_session {
        let location = database_path.to_string_lossy().into_owned();
        Arc::new(
            SqliteStorage::open(&location)
                .await
                .context(AuthStorageSnafu {
                    stage: "startup-open-auth-storage",
                })?,
        )
    } else {
        tracing::info!("session persistence disabled, keeping auth state in memory");
        Arc::new(MemoryKeyValueStore::new())
    };

    create_platform(supabase, storage).context(PlatformSnafu {
        stage: "startup-create-platform",
    })
}

enum ActiveView {
    Starting,
    SignIn(Entity<SignInView>),
    Callback(Entity<CallbackView>),
    Chat(Entity<ChatView>),
}

/// Window root: hosts exactly one route view and swaps it on navigation.
pub struct AppShell {
    config: Arc<AppConfig>,
    platform: Option<Platform>,
    startup_error: Option<String>,
    pending: Option<Navigate>,
    active: ActiveView,
    bootstrap_task: Option<Task<()>>,
    _deep_link_task: Task<()>,
    view_subscription: Option<Subscription>,
    title_bar_should_move: bool,
}

impl AppShell {
    pub fn new(
        config: Arc<AppConfig>,
        initial_url: Option<String>,
        mut deep_links: UnboundedReceiver<String>,
        cx: &mut Context<Self>,
    ) -> Self {
        let initial_route = initial_url
            .as_deref()
            .and_then(|url| {
                let route = Route::parse(url, &config.app_origin);
                if route.is_none() {
                    tracing::warn!(url, "ignoring launch URL outside the app origin");
                }
                route
            })
            .unwrap_or(Route::Chat);

        let deep_link_task = cx.spawn(async move |this, cx| {
            while let Some(url) = deep_links.next().await {
                if this.update(cx, |this, cx| this.open_url(&url, cx)).is_err() {
                    break;
                }
            }
        });

        let mut this = Self {
            config,
            platform: None,
            startup_error: None,
            pending: Some(Navigate::to(initial_route)),
            active: ActiveView::Starting,
            bootstrap_task: None,
            _deep_link_task: deep_link_task,
            view_subscription: None,
            title_bar_should_move: false,
        };
        this.bootstrap(cx);
        this
    }

    fn bootstrap(&mut self, cx: &mut Context<Self>) {
        let supabase = match self
            .config
            .to_supabase_config()
            .context(ConfigSnafu {
                stage: "startup-read-config",
            }) {
            Ok(supabase) => supabase,
            Err(error) => {
                self.fail_startup(error, cx);
                return;
            }
        };

        let persist_session = self.config.persist_session;
        let database_path = self.config.auth_database_path();
        let open = Tokio::spawn(cx, open_platform(supabase, persist_session, database_path));
        self.bootstrap_task = Some(cx.spawn(async move |this, cx| {
            let opened = match open.await {
                Ok(opened) => opened,
                Err(error) => InterruptedSnafu {
                    stage: "startup-open-platform",
                    details: format!("{error:?}"),
                }
                .fail(),
            };
            let _ = this.update(cx, |this, cx| {
                this.bootstrap_task = None;
                match opened {
                    Ok(platform) => {
                        tracing::info!("platform ready");
                        this.platform = Some(platform);
                        cx.notify();
                    }
                    Err(error) => this.fail_startup(error, cx),
                }
            });
        }));
    }

    fn fail_startup(&mut self, error: StartupError, cx: &mut Context<Self>) {
        tracing::error!(error = %error, "startup failed");
        self.startup_error = Some(error.to_string());
        cx.notify();
    }

    pub fn open_url(&mut self, url: &str, cx: &mut Context<Self>) {
        match Route::parse(url, &self.config.app_origin) {
            Some(route) => self.navigate(Navigate::to(route), cx),
            None => tracing::warn!(url, "ignoring link for an unknown route"),
        }
    }

    fn navigate(&mut self, navigate: Navigate, cx: &mut Context<Self>) {
        self.pending = Some(navigate);
        cx.notify();
    }

    fn mount_pending(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let Some(platform) = self.platform.clone() else {
            return;
        };
        let Some(navigate) = self.pending.take() else {
            return;
        };

        tracing::info!(path = navigate.route.path(), "mounting route");
        let config = self.config.clone();
        // Dropping the previous view releases whatever it held.
        self.view_subscription = None;
        self.active = match navigate.route {
            Route::SignIn => ActiveView::SignIn(cx.new(|cx| {
                SignInView::new(platform, &config.app_origin, navigate.notice, window, cx)
            })),
            Route::AuthCallback { url } => {
                let view = cx.new(|cx| CallbackView::new(platform, url, cx));
                self.view_subscription = Some(cx.subscribe_in(
                    &view,
                    window,
                    |this, _, event: &Navigate, _window, cx| {
                        this.navigate(event.clone(), cx);
                    },
                ));
                ActiveView::Callback(view)
            }
            Route::Chat => {
                let view = cx.new(|cx| ChatView::new(platform, &config.messages_table, window, cx));
                self.view_subscription = Some(cx.subscribe_in(
                    &view,
                    window,
                    |this, _, event: &Navigate, _window, cx| {
                        this.navigate(event.clone(), cx);
                    },
                ));
                ActiveView::Chat(view)
            }
        };
    }

    fn render_top_bar(&self, toolbar_height: Pixels, cx: &Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        div()
            .id("app-top-bar")
            .window_control_area(WindowControlArea::Drag)
            .on_mouse_down_out(cx.listener(|this, _, _window, _cx| {
                this.title_bar_should_move = false;
            }))
            .on_mouse_up(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = false;
                }),
            )
            .on_mouse_down(
                MouseButton::Left,
                cx.listener(|this, _, _window, _cx| {
                    this.title_bar_should_move = true;
                }),
            )
            .on_mouse_move(cx.listener(|this, _, window, _cx| {
                if this.title_bar_should_move {
                    this.title_bar_should_move = false;
                    window.start_window_move();
                }
            }))
            .flex()
            .w_full()
            .h(toolbar_height)
            .flex_shrink_0()
            .pl(px(WINDOW_TOOLBAR_LEFT_SAFE_PADDING))
            .items_center()
            .bg(theme.background)
            .border_b_1()
            .border_color(theme.border)
            .child(
                div()
                    .text_xs()
                    .text_color(theme.muted_foreground)
                    .child(APP_TITLE),
            )
    }

    fn render_placeholder(&self, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        v_flex()
            .id("app-placeholder")
            .size_full()
            .items_center()
            .justify_center()
            .gap_2()
            .map(|column| match &self.startup_error {
                Some(error) => column
                    .child(Label::new(STARTUP_FAILED_LABEL).text_color(theme.danger))
                    .child(
                        Label::new(error.clone())
                            .text_sm()
                            .text_color(theme.muted_foreground),
                    ),
                None => column.child(
                    Label::new(STARTING_LABEL)
                        .text_sm()
                        .text_color(theme.muted_foreground),
                ),
            })
            .into_any_element()
    }
}

impl Render for AppShell {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.mount_pending(window, cx);

        let theme = cx.theme();
        let toolbar_height = window_toolbar_height(window);
        let content = if self.startup_error.is_some() {
            self.render_placeholder(cx)
        } else {
            match &self.active {
                ActiveView::Starting => self.render_placeholder(cx),
                ActiveView::SignIn(view) => view.clone().into_any_element(),
                ActiveView::Callback(view) => view.clone().into_any_element(),
                ActiveView::Chat(view) => view.clone().into_any_element(),
            }
        };

        v_flex()
            .size_full()
            .bg(theme.background)
            .child(self.render_top_bar(toolbar_height, cx))
            .child(
                div()
                    .id("app-route")
                    .flex_1()
                    .min_h_0()
                    .overflow_hidden()
                    .child(content),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_is_used_when_persistence_is_off() {
        let dir = tempfile::tempdir().unwrap();
        let database_path = dir.path().join("auth.sqlite");

        let platform = open_platform(
            SupabaseConfig::new("https://abc.supabase.co", "anon"),
            false,
            database_path.clone(),
        )
        .await;

        assert!(platform.is_ok());
        assert!(!database_path.exists());
    }

    #[tokio::test]
    async fn persisted_storage_creates_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let database_path = dir.path().join("nested").join("auth.sqlite");

        let platform = open_platform(
            SupabaseConfig::new("https://abc.supabase.co", "anon"),
            true,
            database_path.clone(),
        )
        .await;

        assert!(platform.is_ok());
        assert!(database_path.exists());
    }

    #[tokio::test]
    async fn invalid_supabase_url_fails_startup() {
        let dir = tempfile::tempdir().unwrap();

        let error = open_platform(
            SupabaseConfig::new("not a url", "anon"),
            false,
            dir.path().join("auth.sqlite"),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(error, StartupError::Platform { .. }));
    }
}
