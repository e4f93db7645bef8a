use std::path::PathBuf;

use ferrer_ui::app::{APP_TITLE, AppShell, Quit};
use ferrer_ui::config::ConfigStore;
use gpui::*;
use gpui_component::{Root, ThemeRegistry};
use tracing_subscriber::EnvFilter;

/// Bootstraps logging, configuration, the gpui application and its window.
///
/// A URL given as the first argument, or delivered later through the
/// platform's open-URL hook, is routed like a deep link.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_store = ConfigStore::load();
    tracing::info!(path = ?config_store.config_path(), "configuration loaded");
    let config = config_store.config();
    let initial_url = std::env::args().nth(1);
    let (link_tx, link_rx) = futures::channel::mpsc::unbounded::<String>();

    let app = Application::new().with_assets(gpui_component_assets::Assets);
    app.on_open_urls(move |urls| {
        for url in urls {
            if link_tx.unbounded_send(url).is_err() {
                tracing::warn!("app shell is gone, dropping incoming link");
            }
        }
    });

    app.run(move |cx| {
        gpui_tokio_bridge::init(cx);
        gpui_component::init(cx);

        let theme_config = config.clone();
        if let Err(err) = ThemeRegistry::watch_dir(PathBuf::from("./themes"), cx, move |cx| {
            theme_config.apply_theme(None, cx);
        }) {
            tracing::warn!(error = %err, "failed to watch themes directory, using built-in themes");
            config.apply_theme(None, cx);
        }

        cx.on_action(|_: &Quit, cx| {
            cx.quit();
        });
        cx.bind_keys([KeyBinding::new("cmd-q", Quit, None)]);

        cx.spawn(async move |cx| {
            cx.update(|cx| {
                let options = WindowOptions {
                    window_bounds: Some(WindowBounds::Windowed(Bounds::centered(
                        None,
                        size(px(480.), px(720.)),
                        cx,
                    ))),
                    titlebar: Some(TitlebarOptions {
                        title: Some(APP_TITLE.into()),
                        appears_transparent: true,
                        traffic_light_position: Some(point(px(9.), px(9.))),
                    }),
                    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
                    window_decorations: Some(WindowDecorations::Client),
                    #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
                    window_decorations: None,
                    ..Default::default()
                };

                cx.open_window(options, |window, cx| {
                    let shell = cx.new(|cx| AppShell::new(config, initial_url, link_rx, cx));
                    cx.new(|cx| Root::new(shell, window, cx))
                })
                .expect("failed to open main window");

                cx.activate(true);
            })
        })
        .detach();
    });
}
