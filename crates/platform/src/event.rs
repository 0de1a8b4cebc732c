//! Opaque platform events and their translation from winit.
//!
//! The frame loop never sees winit types. [`EventTranslator`] folds the
//! stateful parts of winit's event stream (cursor position, held buttons)
//! into self-contained [`PlatformEvent`]s.

use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// How the window ended up after a size change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeMode {
    Minimized,
    Maximized,
    Restored,
}

/// Classify a size change.
///
/// A zero-area client rectangle counts as minimized, since some platforms
/// report minimization only that way.
pub fn size_mode(width: u32, height: u32, minimized: Option<bool>, maximized: bool) -> SizeMode {
    if minimized == Some(true) || width == 0 || height == 0 {
        SizeMode::Minimized
    } else if maximized {
        SizeMode::Maximized
    } else {
        SizeMode::Restored
    }
}

/// Pointer button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

impl PointerButton {
    fn bit(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Right => 1 << 1,
            Self::Middle => 1 << 2,
        }
    }

    fn from_winit(button: MouseButton) -> Option<Self> {
        match button {
            MouseButton::Left => Some(Self::Left),
            MouseButton::Right => Some(Self::Right),
            MouseButton::Middle => Some(Self::Middle),
            _ => None,
        }
    }
}

/// Set of held pointer buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PointerButtons(u8);

impl PointerButtons {
    pub const NONE: Self = Self(0);

    pub fn contains(self, button: PointerButton) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn set(&mut self, button: PointerButton, held: bool) {
        if held {
            self.0 |= button.bit();
        } else {
            self.0 &= !button.bit();
        }
    }
}

/// Everything the frame loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformEvent {
    /// Window gained (`true`) or lost focus.
    Activate(bool),
    /// Client area changed.
    Size {
        width: u32,
        height: u32,
        mode: SizeMode,
    },
    /// The user grabbed the resize bars.
    EnterSizeMove,
    /// The user released the resize bars.
    ExitSizeMove,
    Quit,
    PointerDown(PointerButton, f32, f32),
    PointerUp(PointerButton, f32, f32),
    PointerMove(PointerButtons, f32, f32),
    KeyUp(KeyCode),
}

/// Converts winit window events into [`PlatformEvent`]s.
///
/// winit reports no enter/exit size-move notifications, so this never
/// produces [`PlatformEvent::EnterSizeMove`] or
/// [`PlatformEvent::ExitSizeMove`].
#[derive(Debug, Default)]
pub struct EventTranslator {
    cursor: (f32, f32),
    buttons: PointerButtons,
}

impl EventTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one window event. `classify` receives the new client size
    /// and reports the window's size mode.
    pub fn translate(
        &mut self,
        event: &WindowEvent,
        classify: impl FnOnce(u32, u32) -> SizeMode,
    ) -> Option<PlatformEvent> {
        match event {
            WindowEvent::Focused(focused) => Some(PlatformEvent::Activate(*focused)),
            WindowEvent::Resized(size) => Some(PlatformEvent::Size {
                width: size.width,
                height: size.height,
                mode: classify(size.width, size.height),
            }),
            WindowEvent::CloseRequested => Some(PlatformEvent::Quit),
            WindowEvent::CursorMoved { position, .. } => {
                Some(self.cursor_moved(position.x as f32, position.y as f32))
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = PointerButton::from_winit(*button)?;
                Some(self.pointer_button(button, *state == ElementState::Pressed))
            }
            WindowEvent::KeyboardInput { event, .. } => match (event.state, event.physical_key) {
                (ElementState::Released, PhysicalKey::Code(code)) => Some(PlatformEvent::KeyUp(code)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Record a cursor move.
    pub fn cursor_moved(&mut self, x: f32, y: f32) -> PlatformEvent {
        self.cursor = (x, y);
        PlatformEvent::PointerMove(self.buttons, x, y)
    }

    /// Record a button press or release at the last cursor position.
    pub fn pointer_button(&mut self, button: PointerButton, pressed: bool) -> PlatformEvent {
        self.buttons.set(button, pressed);
        let (x, y) = self.cursor;
        if pressed {
            PlatformEvent::PointerDown(button, x, y)
        } else {
            PlatformEvent::PointerUp(button, x, y)
        }
    }

    /// Buttons currently held.
    pub fn buttons(&self) -> PointerButtons {
        self.buttons
    }
}
