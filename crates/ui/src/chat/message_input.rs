use gpui::*;
use gpui_component::{
    ActiveTheme,
    button::Button,
    h_flex,
    input::{Input, InputEvent, InputState},
};

use crate::chat::events::ComposeSubmitted;
use crate::theme::ChatStyles;

pub const COMPOSER_PLACEHOLDER: &str = "Escribe un mensaje…";
pub const SEND_LABEL: &str = "Enviar";

/// Single-line composer. The owner decides whether a submission is sent and
/// clears the buffer itself.
pub struct MessageInput {
    input_state: Entity<InputState>,
    enabled: bool,
}

impl EventEmitter<ComposeSubmitted> for MessageInput {}

impl MessageInput {
    pub fn new(window: &mut Window, cx: &mut Context<Self>) -> Self {
        let input_state = cx.new(|cx| InputState::new(window, cx).placeholder(COMPOSER_PLACEHOLDER));

        cx.subscribe_in(
            &input_state,
            window,
            |this, _, event: &InputEvent, _window, cx| {
                if let InputEvent::PressEnter { secondary: false } = event {
                    this.submit(cx);
                }
            },
        )
        .detach();

        Self {
            input_state,
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, cx: &mut Context<Self>) {
        if self.enabled != enabled {
            self.enabled = enabled;
            cx.notify();
        }
    }

    pub fn value(&self, cx: &App) -> String {
        self.input_state.read(cx).value().to_string()
    }

    pub fn clear(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_value("", window, cx);
        });
    }

    fn submit(&mut self, cx: &mut Context<Self>) {
        if !self.enabled {
            return;
        }
        let text = self.value(cx);
        cx.emit(ComposeSubmitted::new(text));
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let styles = ChatStyles::standard();
        let enabled = self.enabled;

        h_flex()
            .id("message-input")
            .w_full()
            .gap_2()
            .p_3()
            .items_center()
            .bg(theme.background)
            .child(
                div()
                    .flex_1()
                    .min_w_0()
                    .child(Input::new(&self.input_state).w_full().disabled(!enabled)),
            )
            .child(
                styles.send_button.apply(
                    Button::new("send-message")
                        .label(SEND_LABEL)
                        .disabled(!enabled)
                        .on_click(cx.listener(|this, _, _window, cx| {
                            this.submit(cx);
                        })),
                ),
            )
    }
}
