use ferrer_platform::ChatMessage;
use gpui::{Hsla, Styled, px, rgba};

/// A filled box: background, text color and spacing. Colors are `0xRRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStyle {
    pub background: u32,
    pub foreground: u32,
    pub radius: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub max_width: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: u32,
    pub size: f32,
    pub bold: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAlignment {
    Start,
    End,
}

/// Everything needed to draw one feed row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowStyle {
    pub alignment: RowAlignment,
    pub sender: TextStyle,
    pub bubble: BoxStyle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatStyles {
    pub own_bubble: BoxStyle,
    pub other_bubble: BoxStyle,
    pub sender_label: TextStyle,
    pub alert: BoxStyle,
    pub error_banner: BoxStyle,
    pub sign_out_button: BoxStyle,
    pub send_button: BoxStyle,
    pub header_title: TextStyle,
}

const BUBBLE_MAX_WIDTH: f32 = 420.;

impl ChatStyles {
    pub const fn standard() -> Self {
        Self {
            own_bubble: BoxStyle {
                background: 0x0078ffff,
                foreground: 0xffffffff,
                radius: 10.,
                padding_x: 12.,
                padding_y: 8.,
                max_width: Some(BUBBLE_MAX_WIDTH),
            },
            other_bubble: BoxStyle {
                background: 0xecececff,
                foreground: 0x333333ff,
                radius: 10.,
                padding_x: 12.,
                padding_y: 8.,
                max_width: Some(BUBBLE_MAX_WIDTH),
            },
            sender_label: TextStyle {
                color: 0x666666ff,
                size: 12.,
                bold: false,
            },
            alert: BoxStyle {
                background: 0x0078ff22,
                foreground: 0x00408bff,
                radius: 6.,
                padding_x: 12.,
                padding_y: 10.,
                max_width: None,
            },
            error_banner: BoxStyle {
                background: 0xd9534f22,
                foreground: 0x8b1e1bff,
                radius: 6.,
                padding_x: 12.,
                padding_y: 8.,
                max_width: None,
            },
            sign_out_button: BoxStyle {
                background: 0xd9534fff,
                foreground: 0xffffffff,
                radius: 6.,
                padding_x: 12.,
                padding_y: 6.,
                max_width: None,
            },
            send_button: BoxStyle {
                background: 0x28a745ff,
                foreground: 0xffffffff,
                radius: 6.,
                padding_x: 16.,
                padding_y: 8.,
                max_width: None,
            },
            header_title: TextStyle {
                color: 0x222222ff,
                size: 18.,
                bold: true,
            },
        }
    }

    /// Own messages align to the end with the primary bubble; the rest to the start.
    pub fn row(&self, message: &ChatMessage, viewer_email: Option<&str>) -> RowStyle {
        if message.is_authored_by(viewer_email) {
            RowStyle {
                alignment: RowAlignment::End,
                sender: self.sender_label,
                bubble: self.own_bubble,
            }
        } else {
            RowStyle {
                alignment: RowAlignment::Start,
                sender: self.sender_label,
                bubble: self.other_bubble,
            }
        }
    }
}

impl Default for ChatStyles {
    fn default() -> Self {
        Self::standard()
    }
}

impl BoxStyle {
    pub fn background_color(&self) -> Hsla {
        rgba(self.background).into()
    }

    pub fn foreground_color(&self) -> Hsla {
        rgba(self.foreground).into()
    }

    pub fn apply<E: Styled>(&self, element: E) -> E {
        let element = element
            .bg(self.background_color())
            .text_color(self.foreground_color())
            .rounded(px(self.radius))
            .px(px(self.padding_x))
            .py(px(self.padding_y));
        match self.max_width {
            Some(width) => element.max_w(px(width)),
            None => element,
        }
    }
}

impl TextStyle {
    pub fn color(&self) -> Hsla {
        rgba(self.color).into()
    }

    pub fn apply<E: Styled>(&self, element: E) -> E {
        let element = element.text_color(self.color()).text_size(px(self.size));
        if self.bold {
            element.font_weight(gpui::FontWeight::BOLD)
        } else {
            element
        }
    }
}
