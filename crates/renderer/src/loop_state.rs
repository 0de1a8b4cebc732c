//! Render Loop State: the pause/resize decision table.
//!
//! Four independent flags rather than one enum, because platform events set
//! them in overlapping ways. Each handler mutates the flags and returns a
//! [`Reaction`] telling the driver what to do with the timer and the surface.
//!
//! | Event                               | Flags                                   | Timer | Resize |
//! |-------------------------------------|-----------------------------------------|-------|--------|
//! | deactivated                         | paused                                  | stop  | no     |
//! | activated                           | !paused                                 | start | no     |
//! | size: minimized                     | paused, minimized, !maximized           |       | no     |
//! | size: maximized                     | !paused, maximized, !minimized          |       | yes    |
//! | size: restored, was minimized       | !paused, !minimized                     |       | yes    |
//! | size: restored, was maximized       | !paused, !maximized                     |       | yes    |
//! | size: restored, dragging            |                                         |       | no     |
//! | size: restored, otherwise           |                                         |       | yes    |
//! | enter size-move                     | paused, resizing                        | stop  | no     |
//! | exit size-move                      | !paused, !resizing                      | start | yes    |

use flipchain_platform::{PlatformEvent, SizeMode};

/// What the timer should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Stop,
}

/// Side effects requested by a state transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    pub timer: Option<TimerCommand>,
    /// Resize the surface to the current client size.
    pub resize: bool,
}

impl Reaction {
    const NONE: Self = Self {
        timer: None,
        resize: false,
    };

    const RESIZE: Self = Self {
        timer: None,
        resize: true,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderLoopState {
    pub paused: bool,
    pub minimized: bool,
    pub maximized: bool,
    /// The user is dragging the resize bars.
    pub resizing: bool,
}

impl RenderLoopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a platform event. Events with no loop-state meaning yield
    /// an empty reaction.
    pub fn apply(&mut self, event: &PlatformEvent) -> Reaction {
        match *event {
            PlatformEvent::Activate(active) => self.activate(active),
            PlatformEvent::Size { mode, .. } => self.size_changed(mode),
            PlatformEvent::EnterSizeMove => self.enter_size_move(),
            PlatformEvent::ExitSizeMove => self.exit_size_move(),
            _ => Reaction::NONE,
        }
    }

    pub fn activate(&mut self, active: bool) -> Reaction {
        self.paused = !active;
        Reaction {
            timer: Some(if active {
                TimerCommand::Start
            } else {
                TimerCommand::Stop
            }),
            resize: false,
        }
    }

    pub fn size_changed(&mut self, mode: SizeMode) -> Reaction {
        match mode {
            SizeMode::Minimized => {
                self.paused = true;
                self.minimized = true;
                self.maximized = false;
                Reaction::NONE
            }
            SizeMode::Maximized => {
                self.paused = false;
                self.minimized = false;
                self.maximized = true;
                Reaction::RESIZE
            }
            SizeMode::Restored if self.minimized => {
                self.paused = false;
                self.minimized = false;
                Reaction::RESIZE
            }
            SizeMode::Restored if self.maximized => {
                self.paused = false;
                self.maximized = false;
                Reaction::RESIZE
            }
            // Deferred to exit_size_move; a drag delivers a stream of sizes.
            SizeMode::Restored if self.resizing => Reaction::NONE,
            SizeMode::Restored => Reaction::RESIZE,
        }
    }

    pub fn enter_size_move(&mut self) -> Reaction {
        self.paused = true;
        self.resizing = true;
        Reaction {
            timer: Some(TimerCommand::Stop),
            resize: false,
        }
    }

    pub fn exit_size_move(&mut self) -> Reaction {
        self.paused = false;
        self.resizing = false;
        Reaction {
            timer: Some(TimerCommand::Start),
            resize: true,
        }
    }
}
