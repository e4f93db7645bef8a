use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::ops::Range;
use std::rc::Rc;

use ferrer_platform::ChatMessage;
use gpui::*;
use gpui_component::{ActiveTheme, label::Label, v_flex, v_virtual_list};

use crate::chat::scroll_manager::ScrollManager;
use crate::theme::{ChatStyles, RowAlignment};

const DEFAULT_CONTENT_WIDTH: Pixels = px(680.);
const LIST_HORIZONTAL_PADDING: Pixels = px(16.);
const CONTENT_WIDTH_CHANGE_EPSILON: f32 = 1.0;
const SENDER_LABEL_HEIGHT: Pixels = px(16.);
const SENDER_LABEL_GAP: Pixels = px(4.);
const ESTIMATED_TEXT_LINE_HEIGHT: Pixels = px(18.);
const ESTIMATED_CHAR_WIDTH: f32 = 7.0;

pub const EMPTY_FEED_LABEL: &str = "Todavía no hay mensajes.";

struct SizeCacheEntry {
    layout_hash: u64,
    height: Pixels,
    measured: bool,
}

/// Virtualized feed rows. Each row is "<name> escribió:" above a bubble.
pub struct MessageList {
    messages: Vec<ChatMessage>,
    viewer_email: Option<String>,
    styles: ChatStyles,
    item_sizes: Rc<Vec<Size<Pixels>>>,
    scroll_manager: ScrollManager,
    size_cache: HashMap<i64, SizeCacheEntry>,
    content_width: Option<Pixels>,
}

impl MessageList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            messages: Vec::new(),
            viewer_email: None,
            styles: ChatStyles::standard(),
            item_sizes: Rc::new(Vec::new()),
            scroll_manager: ScrollManager::new(),
            size_cache: HashMap::new(),
            content_width: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn set_viewer_email(&mut self, email: Option<String>, cx: &mut Context<Self>) {
        self.viewer_email = email;
        cx.notify();
    }

    /// Replaces every row, as after a history load.
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>, cx: &mut Context<Self>) {
        self.messages = messages;
        self.rebuild_item_sizes();
        cx.notify();
    }

    pub fn push_message(&mut self, message: ChatMessage, cx: &mut Context<Self>) {
        self.messages.push(message);
        self.rebuild_item_sizes();
        cx.notify();
    }

    pub fn request_scroll_to_bottom(&mut self, cx: &mut Context<Self>) {
        self.scroll_manager.request_scroll_to_bottom();
        cx.notify();
    }

    fn update_content_width(&mut self, cx: &mut Context<Self>) {
        let list_width = self.scroll_manager.bounds().size.width;
        if list_width <= Pixels::ZERO {
            return;
        }

        let next_content_width = max_pixels(px(1.), list_width - LIST_HORIZONTAL_PADDING * 2);
        let width_changed = self.content_width.is_none_or(|current| {
            (f32::from(current) - f32::from(next_content_width)).abs()
                > CONTENT_WIDTH_CHANGE_EPSILON
        });

        if width_changed {
            self.content_width = Some(next_content_width);
            for entry in self.size_cache.values_mut() {
                entry.measured = false;
            }
            self.rebuild_item_sizes();
            cx.notify();
        }
    }

    fn rebuild_item_sizes(&mut self) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let mut active_ids = HashSet::with_capacity(self.messages.len());
        let mut sizes = Vec::with_capacity(self.messages.len());

        for message in &self.messages {
            let next_hash = layout_hash(message);
            let estimated_height = estimate_message_height(message, content_width, &self.styles);

            let entry = self.size_cache.entry(message.id).or_insert(SizeCacheEntry {
                layout_hash: next_hash,
                height: estimated_height,
                measured: false,
            });

            if entry.layout_hash != next_hash {
                entry.layout_hash = next_hash;
                entry.height = estimated_height;
                entry.measured = false;
            } else if !entry.measured {
                entry.height = estimated_height;
            }

            sizes.push(size(px(0.), entry.height));
            active_ids.insert(message.id);
        }

        self.size_cache.retain(|id, _| active_ids.contains(id));
        self.item_sizes = Rc::new(sizes);
    }

    fn measure_visible_items(
        &mut self,
        visible_range: Range<usize>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) {
        let content_width = self.content_width.unwrap_or(DEFAULT_CONTENT_WIDTH);
        let available_space = size(
            AvailableSpace::Definite(content_width),
            AvailableSpace::MinContent,
        );
        let mut updated = false;

        for index in visible_range {
            let Some(message) = self.messages.get(index).cloned() else {
                continue;
            };

            let mut row = self.render_message_row(&message);
            let measured_height = row.layout_as_root(available_space, window, cx).height;
            let Some(entry) = self.size_cache.get_mut(&message.id) else {
                continue;
            };
            if !entry.measured || pixels_changed(entry.height, measured_height) {
                entry.height = measured_height;
                updated = true;
            }
            entry.measured = true;
        }

        if updated {
            self.rebuild_item_sizes();
            cx.notify();
        }
    }

    fn render_message_row(&self, message: &ChatMessage) -> AnyElement {
        let row = self.styles.row(message, self.viewer_email.as_deref());
        let text = if message.message.is_empty() {
            " ".to_string()
        } else {
            message.message.clone()
        };

        let column = v_flex().w_full().gap(SENDER_LABEL_GAP);
        let column = match row.alignment {
            RowAlignment::End => column.items_end(),
            RowAlignment::Start => column.items_start(),
        };

        column
            .child(row.sender.apply(Label::new(sender_caption(message))))
            .child(row.bubble.apply(div()).child(Label::new(text).text_sm()))
            .into_any_element()
    }
}

pub fn sender_caption(message: &ChatMessage) -> String {
    format!("{} escribió:", message.display_name())
}

impl Render for MessageList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.update_content_width(cx);
        self.scroll_manager.update_follow_state();
        self.scroll_manager.apply_pending_scroll();

        if self.messages.is_empty() {
            let theme = cx.theme();
            return v_flex()
                .size_full()
                .items_center()
                .justify_center()
                .child(
                    Label::new(EMPTY_FEED_LABEL)
                        .text_sm()
                        .text_color(theme.muted_foreground),
                )
                .into_any_element();
        }

        v_flex()
            .size_full()
            .min_h_0()
            .child(
                v_virtual_list(
                    cx.entity().clone(),
                    "message-list",
                    self.item_sizes.clone(),
                    |this, visible_range, window, cx| {
                        this.update_content_width(cx);
                        this.measure_visible_items(visible_range.clone(), window, cx);
                        visible_range
                            .filter_map(|index| {
                                this.messages
                                    .get(index)
                                    .cloned()
                                    .map(|message| this.render_message_row(&message))
                            })
                            .collect::<Vec<_>>()
                    },
                )
                .size_full()
                .px_4()
                .py_3()
                .gap_3()
                .track_scroll(self.scroll_manager.handle()),
            )
            .into_any_element()
    }
}

fn layout_hash(message: &ChatMessage) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_i64(message.id);
    hasher.write(message.display_name().as_bytes());
    hasher.write(message.message.as_bytes());
    hasher.finish()
}

fn estimate_message_height(
    message: &ChatMessage,
    content_width: Pixels,
    styles: &ChatStyles,
) -> Pixels {
    let bubble = styles.other_bubble;
    let bubble_width = bubble
        .max_width
        .map_or(content_width, |max| min_pixels(content_width, px(max)));
    let text_width = max_pixels(px(1.), bubble_width - px(bubble.padding_x) * 2);
    SENDER_LABEL_HEIGHT
        + SENDER_LABEL_GAP
        + estimate_text_height(&message.message, text_width)
        + px(bubble.padding_y) * 2
}

fn estimate_text_height(content: &str, width: Pixels) -> Pixels {
    if content.is_empty() {
        return ESTIMATED_TEXT_LINE_HEIGHT;
    }

    let chars_per_line = (f32::from(width) / ESTIMATED_CHAR_WIDTH).floor().max(1.0) as usize;
    let mut line_count = 0usize;
    for line in content.lines() {
        let char_count = line.chars().count().max(1);
        line_count += char_count.div_ceil(chars_per_line);
    }

    ESTIMATED_TEXT_LINE_HEIGHT * line_count.max(1)
}

fn max_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) >= f32::from(b) { a } else { b }
}

fn min_pixels(a: Pixels, b: Pixels) -> Pixels {
    if f32::from(a) <= f32::from(b) { a } else { b }
}

fn pixels_changed(a: Pixels, b: Pixels) -> bool {
    (f32::from(a) - f32::from(b)).abs() > 0.5
}
