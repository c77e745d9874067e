// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::constants::ERR_POISONED_LOCK;
use crate::{Failure, Status, VetoError};

crate::define_fn_wrapper!(ChangeListener(Fn(&PropertyChange)));
crate::define_fn_wrapper!(VetoableListener(Fn(&PropertyChange) -> Result<(), VetoError>));

pub(crate) const VETOER_PANICKED: &str = "vetoable listener panicked";

/// A change of one observable property of a circuit breaker.
///
/// Change listeners receive one `PropertyChange` per property that changed during a single
/// operation. Vetoable listeners receive the proposed `Status { old: Off, new: On }` change
/// before the circuit breaker turns on.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PropertyChange {
    /// The status changed.
    Status {
        /// Status before the change.
        old: Status,
        /// Status after the change.
        new: Status,
    },

    /// The service level changed.
    ServiceLevel {
        /// Service level before the change.
        old: f64,
        /// Service level after the change.
        new: f64,
    },

    /// The last recorded failure changed.
    LastFailure {
        /// Failure recorded before the change.
        old: Option<Failure>,
        /// Failure recorded after the change.
        new: Option<Failure>,
    },

    /// The time the circuit breaker tripped changed.
    TrippedAt {
        /// Trip time before the change.
        old: Option<SystemTime>,
        /// Trip time after the change.
        new: Option<SystemTime>,
    },
}

impl PropertyChange {
    /// Returns the `snake_case` name of the changed property.
    #[must_use]
    pub fn property_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ServiceLevel { .. } => "service_level",
            Self::LastFailure { .. } => "last_failure",
            Self::TrippedAt { .. } => "tripped_at",
        }
    }
}

/// Handle of a registered listener, used to remove it again.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    registered: Mutex<Registered>,
}

#[derive(Debug, Default)]
struct Registered {
    change: Vec<(ListenerId, ChangeListener)>,
    vetoable: Vec<(ListenerId, VetoableListener)>,
}

impl Listeners {
    pub fn add_change(&self, listener: ChangeListener) -> ListenerId {
        let id = self.next_id();
        self.registered.lock().expect(ERR_POISONED_LOCK).change.push((id, listener));
        id
    }

    pub fn add_vetoable(&self, listener: VetoableListener) -> ListenerId {
        let id = self.next_id();
        self.registered.lock().expect(ERR_POISONED_LOCK).vetoable.push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registered = self.registered.lock().expect(ERR_POISONED_LOCK);
        let before = registered.change.len() + registered.vetoable.len();
        registered.change.retain(|(listener_id, _)| *listener_id != id);
        registered.vetoable.retain(|(listener_id, _)| *listener_id != id);
        before != registered.change.len() + registered.vetoable.len()
    }

    /// Notifies change listeners in registration order.
    ///
    /// Returns the number of listeners that panicked. A panicking listener does not prevent the
    /// remaining listeners from being notified.
    pub fn notify(&self, changes: &[PropertyChange]) -> usize {
        if changes.is_empty() {
            return 0;
        }

        // Listeners run outside the lock so that they can call back into the breaker.
        let listeners: Vec<ChangeListener> = {
            let registered = self.registered.lock().expect(ERR_POISONED_LOCK);
            registered.change.iter().map(|(_, l)| l.clone()).collect()
        };

        let mut panicked = 0;
        for change in changes {
            for listener in &listeners {
                if catch_unwind(AssertUnwindSafe(|| listener.call(change))).is_err() {
                    panicked += 1;
                }
            }
        }

        panicked
    }

    /// Consults vetoable listeners in registration order. The first veto wins.
    pub fn check(&self, change: &PropertyChange) -> Result<(), VetoError> {
        let listeners: Vec<VetoableListener> = {
            let registered = self.registered.lock().expect(ERR_POISONED_LOCK);
            registered.vetoable.iter().map(|(_, l)| l.clone()).collect()
        };

        for listener in &listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.call(change))) {
                Ok(Ok(())) => {}
                Ok(Err(veto)) => return Err(veto),
                Err(_) => return Err(VetoError::new(VETOER_PANICKED)),
            }
        }

        Ok(())
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn status_change() -> PropertyChange {
        PropertyChange::Status {
            old: Status::Off,
            new: Status::On,
        }
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> ChangeListener {
        let log = Arc::clone(log);
        ChangeListener::new(move |_| log.lock().unwrap().push(label))
    }

    #[test]
    fn property_names() {
        assert_eq!(status_change().property_name(), "status");
        assert_eq!(PropertyChange::ServiceLevel { old: 1.0, new: 0.5 }.property_name(), "service_level");
        assert_eq!(PropertyChange::LastFailure { old: None, new: None }.property_name(), "last_failure");
        assert_eq!(PropertyChange::TrippedAt { old: None, new: None }.property_name(), "tripped_at");
    }

    #[test]
    fn notify_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        listeners.add_change(recording(&log, "first"));
        listeners.add_change(recording(&log, "second"));

        let panicked = listeners.notify(&[status_change()]);

        assert_eq!(panicked, 0);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn notify_without_changes_skips_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        listeners.add_change(recording(&log, "first"));

        listeners.notify(&[]);

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn notify_continues_after_panic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        listeners.add_change(ChangeListener::new(|_| panic!("listener failure")));
        listeners.add_change(recording(&log, "second"));

        let panicked = listeners.notify(&[status_change(), status_change()]);

        assert_eq!(panicked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["second", "second"]);
    }

    #[test]
    fn remove_listener() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::default();
        let first = listeners.add_change(recording(&log, "first"));
        let vetoer = listeners.add_vetoable(VetoableListener::new(|_| Err(VetoError::new("no"))));

        assert!(listeners.remove(first));
        assert!(listeners.remove(vetoer));
        assert!(!listeners.remove(first));

        listeners.notify(&[status_change()]);
        assert!(log.lock().unwrap().is_empty());
        assert!(listeners.check(&status_change()).is_ok());
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let listeners = Listeners::default();
        let change = listeners.add_change(ChangeListener::new(|_| {}));
        let vetoable = listeners.add_vetoable(VetoableListener::new(|_| Ok(())));

        assert_ne!(change, vetoable);
    }

    #[test]
    fn check_first_veto_wins() {
        let consulted = Arc::new(AtomicUsize::new(0));
        let consulted_clone = Arc::clone(&consulted);
        let listeners = Listeners::default();
        listeners.add_vetoable(VetoableListener::new(|_| Err(VetoError::new("first"))));
        listeners.add_vetoable(VetoableListener::new(move |_| {
            consulted_clone.fetch_add(1, Ordering::Relaxed);
            Err(VetoError::new("second"))
        }));

        let veto = listeners.check(&status_change()).unwrap_err();

        assert_eq!(veto.reason(), "first");
        assert_eq!(consulted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn check_passes_without_vetoers() {
        assert!(Listeners::default().check(&status_change()).is_ok());
    }

    #[test]
    fn check_panicking_vetoer_is_a_veto() {
        let listeners = Listeners::default();
        listeners.add_vetoable(VetoableListener::new(|_| panic!("vetoer failure")));

        let veto = listeners.check(&status_change()).unwrap_err();

        assert_eq!(veto.reason(), VETOER_PANICKED);
    }
}
