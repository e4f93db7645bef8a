use ferrer_platform::{
    ChangeFilter, ChannelEvent, ChannelStatus, ChatMessage, Platform, RealtimeProvider, Session,
};
use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;

use crate::chat::composer::{Composer, send_message};
use crate::chat::events::ComposeSubmitted;
use crate::chat::feed::{HISTORY_FAILED_NOTICE, MessageFeed, load_history};
use crate::chat::subscription::RealtimeSubscription;
use crate::chat::{MessageInput, MessageList};
use crate::routes::{Navigate, Route};
use crate::session::{GateOutcome, SessionGate, check_session};
use crate::tasks::{TaskResult, settle};
use crate::theme::ChatStyles;

pub const CHAT_TITLE: &str = "Chat del Evento Ferrer";
pub const SIGN_OUT_LABEL: &str = "Salir";
pub const RETRY_LABEL: &str = "Reintentar";
pub const CHECKING_SESSION_LABEL: &str = "Verificando sesión…";
pub const REALTIME_UNAVAILABLE_NOTICE: &str =
    "El chat en vivo no está disponible. Los mensajes nuevos no aparecerán solos.";
pub const REALTIME_CLOSED_NOTICE: &str = "El chat en vivo se desconectó.";

/// The `/chat` screen: gate, history, live channel and composer.
pub struct ChatView {
    platform: Platform,
    gate: SessionGate,
    feed: MessageFeed,
    subscription: RealtimeSubscription<Task<()>>,
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    styles: ChatStyles,
    gate_task: Option<Task<()>>,
    history_task: Option<Task<()>>,
    sign_out_task: Option<Task<()>>,
    composer: Composer,
    realtime_notice: Option<String>,
    _subscriptions: Vec<Subscription>,
}

impl EventEmitter<Navigate> for ChatView {}

impl ChatView {
    pub fn new(
        platform: Platform,
        messages_table: &str,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let message_list = cx.new(MessageList::new);
        let message_input = cx.new(|cx| MessageInput::new(window, cx));

        let subscriptions = vec![
            cx.subscribe_in(
                &message_input,
                window,
                |this, _, event: &ComposeSubmitted, window, cx| {
                    this.handle_compose(event, window, cx);
                },
            ),
            cx.on_release(|this, _cx| {
                this.release_channel();
            }),
        ];

        let mut this = Self {
            platform,
            gate: SessionGate::new(),
            feed: MessageFeed::new(),
            subscription: RealtimeSubscription::new(ChangeFilter::inserts_on(messages_table)),
            message_list,
            message_input,
            styles: ChatStyles::standard(),
            gate_task: None,
            history_task: None,
            sign_out_task: None,
            composer: Composer::new(),
            realtime_notice: None,
            _subscriptions: subscriptions,
        };
        this.begin_session_check(cx);
        this
    }

    fn begin_session_check(&mut self, cx: &mut Context<Self>) {
        if let Err(rejection) = self.gate.begin() {
            tracing::debug!(?rejection, "session check already started");
            return;
        }

        let auth = self.platform.auth.clone();
        let check = Tokio::spawn(cx, async move { check_session(auth.as_ref()).await });
        self.gate_task = Some(cx.spawn(async move |this, cx| {
            let checked = settle("chat-session-check", check.await);
            let _ = this.update(cx, |this, cx| {
                this.finish_session_check(checked, cx);
            });
        }));
    }

    fn finish_session_check(
        &mut self,
        checked: TaskResult<Option<Session>>,
        cx: &mut Context<Self>,
    ) {
        self.gate_task = None;
        match self.gate.resolve(checked) {
            Ok(GateOutcome::Render(user)) => {
                tracing::info!(user_id = %user.id, "session verified, opening chat");
                let email = user.email.clone();
                self.message_list.update(cx, |list, cx| {
                    list.set_viewer_email(email, cx);
                });
                self.message_input.update(cx, |input, cx| {
                    input.set_enabled(true, cx);
                });
                self.reload_history(cx);
                self.open_channel(cx);
            }
            Ok(GateOutcome::Redirect(navigate)) => cx.emit(navigate),
            Err(rejection) => {
                tracing::warn!(?rejection, "ignoring session check result");
            }
        }
        cx.notify();
    }

    fn reload_history(&mut self, cx: &mut Context<Self>) {
        if self.history_task.is_some() {
            return;
        }

        self.feed.begin_load();
        let store = self.platform.store.clone();
        let load = Tokio::spawn(cx, async move { load_history(store.as_ref()).await });
        self.history_task = Some(cx.spawn(async move |this, cx| {
            let loaded = settle("chat-history-load", load.await);
            let _ = this.update(cx, |this, cx| {
                this.finish_history(loaded, cx);
            });
        }));
        cx.notify();
    }

    fn finish_history(
        &mut self,
        loaded: TaskResult<Vec<ChatMessage>>,
        cx: &mut Context<Self>,
    ) {
        self.history_task = None;
        let scroll = self.feed.finish_load(loaded);
        let messages = self.feed.messages().to_vec();
        tracing::debug!(count = messages.len(), "history applied");
        self.message_list.update(cx, |list, cx| {
            list.set_messages(messages, cx);
            if scroll {
                list.request_scroll_to_bottom(cx);
            }
        });
        cx.notify();
    }

    fn open_channel(&mut self, cx: &mut Context<Self>) {
        let (mut stream, worker) = match self.subscription.open(self.platform.realtime.as_ref()) {
            Ok(Some(opened)) => opened,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(error = %error, "realtime channel unavailable");
                self.realtime_notice = Some(REALTIME_UNAVAILABLE_NOTICE.to_string());
                cx.notify();
                return;
            }
        };

        // The worker must outlive the reader so it can leave the channel.
        Tokio::spawn(cx, worker).detach();

        let reader = cx.spawn(async move |this, cx| {
            while let Some(event) = stream.recv().await {
                let delivered = this.update(cx, |this, cx| {
                    this.handle_channel_event(event, cx);
                });
                if delivered.is_err() {
                    break;
                }
            }
        });
        self.subscription.attach(reader);
    }

    fn handle_channel_event(&mut self, event: ChannelEvent, cx: &mut Context<Self>) {
        match event {
            ChannelEvent::Inserted(message) => {
                self.feed.append(message.clone());
                self.message_list.update(cx, |list, cx| {
                    list.push_message(message, cx);
                    list.request_scroll_to_bottom(cx);
                });
            }
            ChannelEvent::Status(status) => {
                self.subscription.apply_status(&status);
                self.realtime_notice = realtime_notice(&status);
            }
            ChannelEvent::Error(reason) => {
                tracing::warn!(error = %reason, "realtime channel error");
                self.realtime_notice = Some(format!("Chat en vivo: {reason}"));
            }
        }
        cx.notify();
    }

    fn handle_compose(
        &mut self,
        event: &ComposeSubmitted,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        self.composer.edit(event.text.clone());
        let record = match self.composer.submit(self.gate.viewer()) {
            Ok(record) => record,
            Err(rejection) => {
                tracing::debug!(?rejection, "submission ignored");
                return;
            }
        };

        self.message_input.update(cx, |input, cx| {
            input.clear(window, cx);
        });

        let store = self.platform.store.clone();
        let insert = Tokio::spawn(cx, async move { send_message(store.as_ref(), record).await });
        cx.spawn(async move |this, cx| {
            let sent = settle("chat-message-insert", insert.await);
            let _ = this.update(cx, |this, cx| {
                this.finish_send(sent, cx);
            });
        })
        .detach();
        cx.notify();
    }

    fn finish_send(&mut self, sent: TaskResult<()>, cx: &mut Context<Self>) {
        self.composer.finish_send(sent);
        cx.notify();
    }

    fn sign_out(&mut self, cx: &mut Context<Self>) {
        if self.sign_out_task.is_some() {
            return;
        }

        self.release_channel();
        self.message_input.update(cx, |input, cx| {
            input.set_enabled(false, cx);
        });

        let auth = self.platform.auth.clone();
        let sign_out = Tokio::spawn(cx, async move { auth.sign_out().await });
        self.sign_out_task = Some(cx.spawn(async move |this, cx| {
            if let Err(error) = settle("chat-sign-out", sign_out.await) {
                tracing::warn!(error = %error, "server sign-out failed, local session cleared");
            }
            let _ = this.update(cx, |this, cx| {
                this.sign_out_task = None;
                cx.emit(Navigate::to(Route::SignIn));
            });
        }));
        cx.notify();
    }

    /// Returns true only for the call that released the live channel.
    pub fn release_channel(&mut self) -> bool {
        release_live_channel(&mut self.subscription, self.platform.realtime.as_ref())
    }
}

/// Shared by sign-out and view release; only the first call unsubscribes.
fn release_live_channel<R>(
    subscription: &mut RealtimeSubscription<R>,
    realtime: &dyn RealtimeProvider,
) -> bool {
    let released = subscription.release(realtime);
    if released {
        tracing::info!(table = %subscription.filter().table, "realtime channel released");
    }
    released
}

fn realtime_notice(status: &ChannelStatus) -> Option<String> {
    match status {
        ChannelStatus::Subscribed => None,
        ChannelStatus::Reconnecting { attempt, retry_in } => Some(format!(
            "Reconectando el chat en vivo (intento {attempt}, en {} s)…",
            retry_in.as_secs().max(1)
        )),
        ChannelStatus::Closed => Some(REALTIME_CLOSED_NOTICE.to_string()),
    }
}

impl ChatView {
    fn render_header(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let signing_out = self.sign_out_task.is_some();

        h_flex()
            .id("chat-header")
            .w_full()
            .flex_shrink_0()
            .px_4()
            .py_3()
            .items_center()
            .justify_between()
            .border_b_1()
            .border_color(theme.border)
            .child(self.styles.header_title.apply(div()).child(CHAT_TITLE))
            .child(
                self.styles.sign_out_button.apply(
                    Button::new("chat-sign-out")
                        .label(SIGN_OUT_LABEL)
                        .disabled(signing_out)
                        .on_click(cx.listener(|this, _, _window, cx| {
                            this.sign_out(cx);
                        })),
                ),
            )
    }

    fn render_banners(&self, cx: &mut Context<Self>) -> impl IntoElement {
        let history_failed = self.feed.load_error().is_some();

        v_flex()
            .id("chat-banners")
            .w_full()
            .flex_shrink_0()
            .gap_2()
            .px_4()
            .when(history_failed, |column| {
                column.child(
                    self.styles
                        .error_banner
                        .apply(h_flex())
                        .w_full()
                        .mt_2()
                        .justify_between()
                        .items_center()
                        .child(Label::new(HISTORY_FAILED_NOTICE).text_sm())
                        .child(
                            Button::new("chat-history-retry")
                                .ghost()
                                .small()
                                .label(RETRY_LABEL)
                                .on_click(cx.listener(|this, _, _window, cx| {
                                    this.reload_history(cx);
                                })),
                        ),
                )
            })
            .when_some(self.realtime_notice.clone(), |column, notice| {
                column.child(
                    self.styles
                        .alert
                        .apply(div())
                        .mt_2()
                        .child(Label::new(notice).text_sm()),
                )
            })
            .when_some(self.composer.send_error(), |column, error| {
                column.child(
                    self.styles
                        .error_banner
                        .apply(div())
                        .mt_2()
                        .child(Label::new(error).text_sm()),
                )
            })
    }
}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let background = theme.background;
        let border = theme.border;
        let muted = theme.muted_foreground;

        let view = v_flex()
            .id("chat-view")
            .relative()
            .size_full()
            .min_h_0()
            .overflow_hidden()
            .bg(background)
            .child(self.render_header(cx));

        // Nothing from the feed is shown until the session is verified.
        if !self.gate.allows_content() {
            return view.child(
                v_flex()
                    .flex_1()
                    .items_center()
                    .justify_center()
                    .child(Label::new(CHECKING_SESSION_LABEL).text_sm().text_color(muted)),
            );
        }

        view.child(self.render_banners(cx))
            .child(
                div()
                    .id("chat-view-message-list")
                    .flex_1()
                    .min_h_0()
                    .child(self.message_list.clone()),
            )
            .child(
                div()
                    .id("chat-view-message-input")
                    .flex_shrink_0()
                    .w_full()
                    .border_t_1()
                    .border_color(border)
                    .child(self.message_input.clone()),
            )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ferrer_platform::ChannelEventStream;

    use super::*;
    use crate::test_support::FakeRealtime;

    #[test]
    fn sign_out_then_view_release_unsubscribes_once() {
        let realtime = FakeRealtime::default();
        let mut subscription: RealtimeSubscription<ChannelEventStream> =
            RealtimeSubscription::new(ChangeFilter::inserts_on("messages"));
        let (stream, _worker) = subscription.open(&realtime).unwrap().unwrap();
        subscription.attach(stream);

        assert!(release_live_channel(&mut subscription, &realtime));
        assert!(!release_live_channel(&mut subscription, &realtime));

        assert_eq!(realtime.subscriptions(), 1);
        assert_eq!(realtime.unsubscribes(), 1);
        assert_eq!(realtime.released(), 1);
    }

    #[test]
    fn release_before_the_reader_attaches_still_closes_the_channel() {
        let realtime = FakeRealtime::default();
        let mut subscription: RealtimeSubscription<ChannelEventStream> =
            RealtimeSubscription::new(ChangeFilter::inserts_on("messages"));
        let (stream, _worker) = subscription.open(&realtime).unwrap().unwrap();

        assert!(release_live_channel(&mut subscription, &realtime));
        subscription.attach(stream);

        assert_eq!(realtime.unsubscribes(), 1);
        assert_eq!(realtime.released(), 1);
    }

    #[test]
    fn subscribed_clears_the_realtime_notice() {
        assert_eq!(realtime_notice(&ChannelStatus::Subscribed), None);
    }

    #[test]
    fn reconnecting_names_the_attempt() {
        let notice = realtime_notice(&ChannelStatus::Reconnecting {
            attempt: 3,
            retry_in: Duration::from_secs(4),
        })
        .unwrap();
        assert!(notice.contains("intento 3"));
        assert!(notice.contains("4 s"));
    }

    #[test]
    fn closed_channel_is_reported() {
        assert_eq!(
            realtime_notice(&ChannelStatus::Closed).as_deref(),
            Some(REALTIME_CLOSED_NOTICE)
        );
    }
}
