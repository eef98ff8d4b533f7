//! Nested progress reporting.
//!
//! Long operations report progress through a tree of scopes. Each scope owns
//! a share of its parent's remaining range, so a leaf reporting 0–100 maps
//! onto a narrow slice of the overall percentage. Every scope fires a final
//! `End` update at 100 when it is dropped, which keeps the composed overall
//! value monotone across nesting on every exit path, errors included.
//!
//! Callbacks are optional and run synchronously on the caller's thread;
//! re-entering the engine from a callback is not supported.

use std::cell::Cell;
use std::rc::Rc;

/// Classification of a status update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressKind {
    /// A scope began.
    Start,
    /// A scope finished; `progress` is 100.
    End,
    /// A bounded progress step.
    Percentage,
    /// Activity without a measurable bound.
    Unbounded,
    /// A non-fatal condition the caller should surface.
    Warning,
}

/// One status update delivered to the callback.
#[derive(Debug)]
pub struct StatusEvent<'a> {
    /// Update classification.
    pub kind: ProgressKind,
    /// Progress of the reporting scope, 0–100.
    pub progress: f32,
    /// Composed overall progress, 0–100.
    pub overall_progress: f32,
    /// Share of the parent range this step represents.
    pub size_of_job: f32,
    /// Depth of the reporting scope.
    pub nesting_level: i32,
    /// Human-readable description.
    pub info: &'a str,
}

/// Callback receiving status updates.
pub type StatusCallback = Rc<dyn Fn(&StatusEvent<'_>)>;

/// Callback configuration shared by every scope of an operation.
#[derive(Clone)]
pub struct CallbackSettings {
    /// Receiver of status updates; `None` disables reporting entirely.
    pub callback: Option<StatusCallback>,
    /// Maximum nesting level reported; `-1` reports every level.
    pub verbosity_level: i32,
}

impl CallbackSettings {
    /// Settings that report every nesting level to `callback`.
    #[must_use]
    pub fn verbose(callback: StatusCallback) -> Self {
        Self {
            callback: Some(callback),
            verbosity_level: -1,
        }
    }
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            callback: None,
            verbosity_level: -1,
        }
    }
}

impl std::fmt::Debug for CallbackSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSettings")
            .field("callback", &self.callback.is_some())
            .field("verbosity_level", &self.verbosity_level)
            .finish()
    }
}

#[derive(Clone, Copy, Default)]
struct LastUpdate {
    progress: f32,
    size_of_job: f32,
}

/// A nested progress-reporting region.
///
/// Created either as the root of an operation or as a child covering a share
/// of its parent's remaining range. Dropping a scope fires its final `End`
/// update.
pub struct StatusScope<'p> {
    parent: Option<&'p StatusScope<'p>>,
    settings: CallbackSettings,
    nesting_level: i32,
    last: Cell<LastUpdate>,
}

impl StatusScope<'_> {
    /// Creates the root scope of an operation and fires its `Start` update.
    #[must_use]
    pub fn root(settings: CallbackSettings) -> StatusScope<'static> {
        let scope = StatusScope {
            parent: None,
            settings,
            nesting_level: 0,
            last: Cell::new(LastUpdate::default()),
        };
        scope.update(ProgressKind::Start, 0.0, 0.0, "Starting process");
        scope
    }

    /// Reports a status update for this scope.
    pub fn update(&self, kind: ProgressKind, progress: f32, size_of_job: f32, info: &str) {
        self.last.set(LastUpdate {
            progress,
            size_of_job,
        });

        let Some(callback) = self.settings.callback.as_ref() else {
            return;
        };
        if self.nesting_level >= self.settings.verbosity_level
            && self.settings.verbosity_level != -1
        {
            return;
        }

        let (overall_progress, _scale) = self.overall();
        callback(&StatusEvent {
            kind,
            progress,
            overall_progress,
            size_of_job,
            nesting_level: self.nesting_level,
            info,
        });
    }

    /// Opens a nested scope covering `size_of_job` percent of this scope.
    ///
    /// The parent is first advanced to `progress`, then the child fires its
    /// own `Start` update at nesting level + 1.
    #[must_use]
    pub fn child(&self, progress: f32, size_of_job: f32, info: &str) -> StatusScope<'_> {
        self.update(ProgressKind::Percentage, progress, size_of_job, info);
        let nested = StatusScope {
            parent: Some(self),
            settings: self.settings.clone(),
            nesting_level: self.nesting_level + 1,
            last: Cell::new(LastUpdate::default()),
        };
        nested.update(ProgressKind::Start, 0.0, 0.0, "Starting process");
        nested
    }

    /// Reports whether per-item updates would reach the callback.
    ///
    /// Loops use this to skip building status messages that the verbosity
    /// gate would drop anyway.
    #[must_use]
    pub fn requires_updates(&self) -> bool {
        self.settings.callback.is_some()
            && (self.settings.verbosity_level == -1
                || self.nesting_level <= self.settings.verbosity_level)
    }

    fn overall(&self) -> (f32, f32) {
        let last = self.last.get();
        match self.parent {
            Some(parent) => {
                let (parent_progress, parent_scale) = parent.overall();
                (
                    parent_progress + last.progress * parent_scale,
                    (last.size_of_job / 100.0) * parent_scale,
                )
            }
            None => (last.progress, last.size_of_job / 100.0),
        }
    }
}

impl Drop for StatusScope<'_> {
    fn drop(&mut self) {
        self.update(ProgressKind::End, 100.0, 0.0, "Process complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording() -> (CallbackSettings, Rc<RefCell<Vec<(ProgressKind, f32, i32)>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let callback: StatusCallback = Rc::new(move |event: &StatusEvent<'_>| {
            sink.borrow_mut()
                .push((event.kind, event.overall_progress, event.nesting_level));
        });
        (CallbackSettings::verbose(callback), events)
    }

    #[test]
    fn scopes_fire_start_and_end() {
        let (settings, events) = recording();
        {
            let _scope = StatusScope::root(settings);
        }
        let events = events.borrow();
        assert_eq!(events.first().expect("start").0, ProgressKind::Start);
        let last = events.last().expect("end");
        assert_eq!(last.0, ProgressKind::End);
        assert!((last.1 - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nested_progress_composes_into_the_parent_range() {
        let (settings, events) = recording();
        {
            let root = StatusScope::root(settings);
            root.update(ProgressKind::Percentage, 10.0, 0.0, "phase one");
            {
                let child = root.child(20.0, 40.0, "phase two");
                child.update(ProgressKind::Percentage, 50.0, 0.0, "halfway");
            }
            root.update(ProgressKind::Percentage, 60.0, 0.0, "phase three");
        }
        let overall: Vec<f32> = events.borrow().iter().map(|event| event.1).collect();
        // The child's 50% lands in the middle of the 20..60 parent window.
        assert!(overall.iter().any(|value| (value - 40.0).abs() < 0.001));
    }

    #[test]
    fn overall_progress_is_monotone_non_decreasing() {
        let (settings, events) = recording();
        {
            let root = StatusScope::root(settings);
            root.update(ProgressKind::Percentage, 0.0, 10.0, "a");
            {
                let child = root.child(10.0, 50.0, "b");
                for step in 0..=10 {
                    child.update(ProgressKind::Percentage, step as f32 * 10.0, 0.0, "s");
                }
            }
            root.update(ProgressKind::Percentage, 60.0, 40.0, "c");
            {
                let _tail = root.child(60.0, 40.0, "d");
            }
        }
        let overall: Vec<f32> = events.borrow().iter().map(|event| event.1).collect();
        assert!(
            overall.windows(2).all(|pair| pair[0] <= pair[1] + 1e-3),
            "overall regressed: {overall:?}"
        );
        assert!(overall.iter().all(|value| *value <= 100.0 + 1e-3));
    }

    #[test]
    fn verbosity_gates_deep_scopes() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let callback: StatusCallback = Rc::new(move |event: &StatusEvent<'_>| {
            sink.borrow_mut().push(event.nesting_level);
        });
        let settings = CallbackSettings {
            callback: Some(callback),
            verbosity_level: 1,
        };
        {
            let root = StatusScope::root(settings);
            let child = root.child(0.0, 100.0, "visible");
            assert!(!child.requires_updates() || child.nesting_level <= 1);
            let grandchild = child.child(0.0, 100.0, "silent");
            grandchild.update(ProgressKind::Percentage, 50.0, 0.0, "dropped");
        }
        assert!(events.borrow().iter().all(|level| *level < 1));
    }

    #[test]
    fn disabled_callback_reports_nothing_and_never_requires_updates() {
        let root = StatusScope::root(CallbackSettings::default());
        assert!(!root.requires_updates());
        root.update(ProgressKind::Percentage, 50.0, 0.0, "silent");
    }
}
