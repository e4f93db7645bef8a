use ferrer_platform::{Platform, Session};
use gpui::*;
use gpui_component::{ActiveTheme, label::Label, v_flex};
use gpui_tokio_bridge::Tokio;

use crate::callback::flow::{VALIDATING_MESSAGE, callback_outcome, complete_sign_in};
use crate::routes::Navigate;
use crate::tasks::{TaskResult, settle};

/// The `/auth/callback` screen: exchanges the link's code, then navigates away.
pub struct CallbackView {
    exchange_task: Option<Task<()>>,
}

impl EventEmitter<Navigate> for CallbackView {}

impl CallbackView {
    pub fn new(platform: Platform, callback_url: String, cx: &mut Context<Self>) -> Self {
        let auth = platform.auth.clone();
        let exchange = Tokio::spawn(cx, async move {
            complete_sign_in(auth.as_ref(), &callback_url).await
        });
        let exchange_task = cx.spawn(async move |this, cx| {
            let exchanged = settle("callback-code-exchange", exchange.await);
            let _ = this.update(cx, |this, cx| {
                this.finish(exchanged, cx);
            });
        });

        Self {
            exchange_task: Some(exchange_task),
        }
    }

    fn finish(&mut self, exchanged: TaskResult<Session>, cx: &mut Context<Self>) {
        self.exchange_task = None;
        cx.emit(callback_outcome(exchanged));
    }
}

impl Render for CallbackView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        v_flex()
            .id("callback-view")
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(
                Label::new(VALIDATING_MESSAGE)
                    .text_sm()
                    .text_color(theme.muted_foreground),
            )
    }
}
