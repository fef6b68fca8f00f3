//! Client state shared by the input, receive, and render activities.
//!
//! Each piece sits behind its own short-lived lock; no lock is ever held
//! across an `.await`. The dirty flag is a plain atomic: setting it
//! guarantees a later render tick observes it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use ratatui::layout::Size;
use relaychat_proto::line::ChatLine;

use crate::input::InputLine;

/// Ordered local history of the conversation.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    lines: Vec<ChatLine>,
}

impl ConversationLog {
    /// Append one line.
    pub fn push(&mut self, line: ChatLine) {
        self.lines.push(line);
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `n` lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[ChatLine] {
        &self.lines[self.lines.len().saturating_sub(n)..]
    }

    /// All lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }
}

/// A transient message drawn over the conversation, e.g. after `/clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Text to show.
    pub text: String,
    generation: u64,
}

/// Everything the renderer needs for one frame, copied out of the locks.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    /// Trailing lines that fit the viewport.
    pub lines: Vec<ChatLine>,
    /// Current input buffer.
    pub input: String,
    /// Whether the input buffer holds a `/command`.
    pub is_command: bool,
    /// Active notice, if any.
    pub notice: Option<String>,
}

/// State shared between the three client activities.
#[derive(Debug)]
pub struct SharedState {
    log: Mutex<ConversationLog>,
    input: Mutex<InputLine>,
    notice: Mutex<Option<Notice>>,
    notice_generation: AtomicU64,
    dirty: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create empty state. The dirty flag starts set so the first tick draws.
    #[must_use]
    pub fn new() -> Self {
        Self::with_input_line(InputLine::default())
    }

    /// Create empty state around a pre-configured input line.
    #[must_use]
    pub fn with_input_line(input: InputLine) -> Self {
        Self {
            log: Mutex::new(ConversationLog::default()),
            input: Mutex::new(input),
            notice: Mutex::new(None),
            notice_generation: AtomicU64::new(0),
            dirty: AtomicBool::new(true),
        }
    }

    /// Append a line to the log and mark the view dirty.
    pub fn push_line(&self, line: ChatLine) {
        self.log.lock().push(line);
        self.mark_dirty();
    }

    /// Empty the log and mark the view dirty.
    pub fn clear_log(&self) {
        self.log.lock().clear();
        self.mark_dirty();
    }

    /// Copy of the whole log.
    #[must_use]
    pub fn log_snapshot(&self) -> ConversationLog {
        self.log.lock().clone()
    }

    /// Run `f` with exclusive access to the input line.
    pub fn with_input<R>(&self, f: impl FnOnce(&mut InputLine) -> R) -> R {
        f(&mut self.input.lock())
    }

    /// Length of the input buffer in characters.
    #[must_use]
    pub fn input_len(&self) -> usize {
        self.input.lock().len()
    }

    /// Show a transient notice. Returns a token for [`Self::dismiss_notice`].
    pub fn show_notice(&self, text: impl Into<String>) -> u64 {
        let generation = self.notice_generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.notice.lock() = Some(Notice {
            text: text.into(),
            generation,
        });
        self.mark_dirty();
        generation
    }

    /// Hide the notice shown with `generation`, unless a newer one replaced it.
    pub fn dismiss_notice(&self, generation: u64) {
        let mut notice = self.notice.lock();
        if notice.as_ref().is_some_and(|n| n.generation == generation) {
            *notice = None;
            drop(notice);
            self.mark_dirty();
        }
    }

    /// Request a redraw on the next tick.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Read and clear the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Copy out what one frame needs, keeping at most `max_lines` lines.
    #[must_use]
    pub fn snapshot(&self, max_lines: usize) -> ViewSnapshot {
        let lines = self.log.lock().tail(max_lines).to_vec();
        let (input, is_command) = {
            let input = self.input.lock();
            (input.as_str().to_string(), input.is_command())
        };
        let notice = self.notice.lock().as_ref().map(|n| n.text.clone());
        ViewSnapshot {
            lines,
            input,
            is_command,
            notice,
        }
    }
}

/// Decides whether a render tick must redraw.
///
/// A redraw happens iff the dirty flag was set, the input length changed, or
/// the viewport size changed since the previous redraw.
#[derive(Debug, Default, Clone)]
pub struct RenderGate {
    last_input_len: Option<usize>,
    last_size: Option<Size>,
}

impl RenderGate {
    /// Evaluate one tick and remember what was observed.
    pub fn should_redraw(&mut self, dirty: bool, input_len: usize, size: Size) -> bool {
        let input_changed = self.last_input_len != Some(input_len);
        let resized = self.last_size != Some(size);
        self.last_input_len = Some(input_len);
        self.last_size = Some(size);
        dirty || input_changed || resized
    }
}
