use ferrer_platform::Platform;
use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme,
    button::{Button, ButtonVariants},
    input::{Input, InputEvent, InputState},
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;

use crate::routes::callback_redirect_url;
use crate::sign_in::flow::{SignInFlow, SignInNotice, request_magic_link};
use crate::tasks::{TaskResult, settle};
use crate::theme::ChatStyles;

pub const SIGN_IN_TITLE: &str = "Evento Ferrer – Acceso";
pub const EMAIL_PLACEHOLDER: &str = "Correo empresarial";

const CARD_WIDTH: f32 = 360.;

/// The `/` screen: asks for an email and sends a magic link.
pub struct SignInView {
    platform: Platform,
    redirect_to: String,
    flow: SignInFlow,
    email_input: Entity<InputState>,
    styles: ChatStyles,
    request_task: Option<Task<()>>,
    _subscriptions: Vec<Subscription>,
}

impl SignInView {
    pub fn new(
        platform: Platform,
        origin: &str,
        notice: Option<String>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let email_input = cx.new(|cx| InputState::new(window, cx).placeholder(EMAIL_PLACEHOLDER));
        let subscriptions = vec![cx.subscribe_in(
            &email_input,
            window,
            |this, _, event: &InputEvent, _window, cx| {
                if let InputEvent::PressEnter { secondary: false } = event {
                    this.submit(cx);
                }
            },
        )];

        let mut flow = SignInFlow::new();
        if let Some(notice) = notice {
            flow.set_notice(SignInNotice::Error(notice));
        }

        Self {
            platform,
            redirect_to: callback_redirect_url(origin),
            flow,
            email_input,
            styles: ChatStyles::standard(),
            request_task: None,
            _subscriptions: subscriptions,
        }
    }

    fn submit(&mut self, cx: &mut Context<Self>) {
        let email = self.email_input.read(cx).value().to_string();
        let request = match self.flow.begin(&email, &self.redirect_to) {
            Ok(request) => request,
            Err(rejection) => {
                tracing::debug!(?rejection, "sign-in submission ignored");
                cx.notify();
                return;
            }
        };

        tracing::info!(redirect_to = %request.redirect_to, "requesting magic link");
        let auth = self.platform.auth.clone();
        let send = Tokio::spawn(cx, async move { request_magic_link(auth.as_ref(), &request).await });
        self.request_task = Some(cx.spawn(async move |this, cx| {
            let sent = settle("sign-in-magic-link", send.await);
            let _ = this.update(cx, |this, cx| {
                this.finish(sent, cx);
            });
        }));
        cx.notify();
    }

    fn finish(&mut self, sent: TaskResult<()>, cx: &mut Context<Self>) {
        self.request_task = None;
        self.flow.finish(sent);
        cx.notify();
    }
}

impl Render for SignInView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let in_flight = self.flow.is_in_flight();
        let notice = self.flow.notice().cloned();

        v_flex()
            .id("sign-in-view")
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(
                v_flex()
                    .id("sign-in-card")
                    .w(px(CARD_WIDTH))
                    .gap_3()
                    .p_6()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.background)
                    .child(self.styles.header_title.apply(div()).child(SIGN_IN_TITLE))
                    .child(Input::new(&self.email_input).w_full().disabled(in_flight))
                    .child(
                        Button::new("sign-in-submit")
                            .primary()
                            .w_full()
                            .label(self.flow.button_label())
                            .disabled(in_flight)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.submit(cx);
                            })),
                    )
                    .when_some(notice, |card, notice| {
                        let style = match notice {
                            SignInNotice::Info(_) => self.styles.alert,
                            SignInNotice::Error(_) => self.styles.error_banner,
                        };
                        card.child(
                            style
                                .apply(div())
                                .w_full()
                                .child(Label::new(notice.text().to_string()).text_sm()),
                        )
                    }),
            )
    }
}
