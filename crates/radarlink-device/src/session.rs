//! Transactional configuration sessions.
//!
//! A [`Session`] suspends sampling when it opens, collects changes into a
//! working copy of the device configuration and, when it ends, writes each
//! touched group exactly once in the device's fixed commit order. Sampling
//! is resumed on every exit path, including drop.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{DeviceError, Result};

/// A device whose configuration can be changed through a [`Session`].
pub trait Configurable {
    /// Cached configuration record.
    type Snapshot: Clone + fmt::Debug;

    /// A group of fields written by one batched command.
    type Group: Copy + Eq + fmt::Debug + 'static;

    /// Order in which changed groups are written.
    const COMMIT_ORDER: &'static [Self::Group];

    /// Current configuration, as last confirmed by the device.
    fn snapshot(&self) -> &Self::Snapshot;

    /// Stop sampling so that configuration commands are accepted.
    fn suspend(&mut self) -> Result<()>;

    /// Restart sampling.
    fn resume(&mut self) -> Result<()>;

    /// Write `group` from `desired`, verify it, and update the snapshot.
    ///
    /// The snapshot must only change once the device acknowledged the write.
    fn write_group(&mut self, group: Self::Group, desired: &Self::Snapshot) -> Result<()>;

    /// Make written groups survive a power cycle, if the device needs to be
    /// told.
    fn persist(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Open,
    Committing,
    Closed,
}

/// A configuration transaction against one device.
///
/// Setters are builder-style and become no-ops once the session carries an
/// error. [`end`](Session::end) commits and resumes sampling; ending twice
/// fails with [`DeviceError::SessionClosed`].
pub struct Session<'d, D: Configurable> {
    device: &'d mut D,
    working: D::Snapshot,
    changed: u32,
    state: SessionState,
    suspend_error: Option<DeviceError>,
    error: Option<DeviceError>,
}

impl<'d, D: Configurable> Session<'d, D> {
    /// Suspend sampling and start collecting changes.
    ///
    /// A failure to suspend is carried and reported by `end`; the session
    /// still accepts changes.
    pub fn open(device: &'d mut D) -> Self {
        let working = device.snapshot().clone();
        let mut session = Self {
            device,
            working,
            changed: 0,
            state: SessionState::Opening,
            suspend_error: None,
            error: None,
        };
        if let Err(err) = session.device.suspend() {
            warn!(error = %err, "failed to suspend sampling");
            session.suspend_error = Some(err);
        }
        session.state = SessionState::Open;
        session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Working copy including uncommitted changes.
    pub fn working(&self) -> &D::Snapshot {
        &self.working
    }

    /// The device behind the session.
    pub fn device(&self) -> &D {
        &*self.device
    }

    /// Error that poisoned the session, if any.
    pub fn error(&self) -> Option<&DeviceError> {
        self.error.as_ref()
    }

    pub fn is_poisoned(&self) -> bool {
        self.error.is_some()
    }

    /// Groups that will be written, in commit order.
    pub fn changed_groups(&self) -> Vec<D::Group> {
        D::COMMIT_ORDER
            .iter()
            .enumerate()
            .filter(|(i, _)| self.changed & (1 << *i) != 0)
            .map(|(_, group)| *group)
            .collect()
    }

    /// Apply `change` to the working copy and mark `group` as touched.
    ///
    /// A failing change poisons the session.
    pub fn update(
        &mut self,
        group: D::Group,
        change: impl FnOnce(&mut D::Snapshot) -> Result<()>,
    ) -> &mut Self {
        if self.error.is_some() || self.state != SessionState::Open {
            return self;
        }
        let Some(bit) = D::COMMIT_ORDER.iter().position(|g| *g == group) else {
            self.error = Some(DeviceError::invalid("group", format!("{group:?}")));
            return self;
        };
        match change(&mut self.working) {
            Ok(()) => self.changed |= 1 << bit,
            Err(err) => {
                debug!(?group, error = %err, "configuration change rejected");
                self.error = Some(err);
            }
        }
        self
    }

    /// Commit touched groups, then resume sampling.
    ///
    /// Groups are written in commit order, stopping at the first failure.
    /// Sampling is resumed whatever happened before. The first error
    /// encountered is returned; later ones are logged.
    pub fn end(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(DeviceError::SessionClosed);
        }
        self.state = SessionState::Committing;

        let mut first = self.suspend_error.take();
        match self.error.take() {
            Some(err) => note(&mut first, err),
            None => self.commit(&mut first),
        }
        self.changed = 0;

        if let Err(err) = self.device.resume() {
            note(&mut first, err);
        }
        self.state = SessionState::Closed;

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn commit(&mut self, first: &mut Option<DeviceError>) {
        let mut written = 0;
        for (bit, group) in D::COMMIT_ORDER.iter().enumerate() {
            if self.changed & (1 << bit) == 0 {
                continue;
            }
            debug!(?group, "writing configuration group");
            match self.device.write_group(*group, &self.working) {
                Ok(()) => written += 1,
                Err(err) => {
                    note(first, err);
                    break;
                }
            }
        }
        if written > 0 {
            if let Err(err) = self.device.persist() {
                note(first, err);
            }
        }
    }
}

fn note(first: &mut Option<DeviceError>, err: DeviceError) {
    match first {
        None => *first = Some(err),
        Some(_) => warn!(error = %err, "additional configuration session failure"),
    }
}

impl<D: Configurable> Drop for Session<'_, D> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            if let Err(err) = self.end() {
                warn!(error = %err, "configuration session closed with error");
            }
        }
    }
}

impl<D: Configurable> fmt::Debug for Session<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("changed", &self.changed_groups())
            .field("working", &self.working)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Group {
        A,
        B,
        C,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Snapshot {
        a: u8,
        b: u8,
        c: u8,
    }

    #[derive(Default)]
    struct Recorder {
        snapshot: Snapshot,
        log: Vec<String>,
        fail_suspend: bool,
        fail_on: Option<Group>,
    }

    impl Configurable for Recorder {
        type Snapshot = Snapshot;
        type Group = Group;
        const COMMIT_ORDER: &'static [Group] = &[Group::A, Group::B, Group::C];

        fn snapshot(&self) -> &Snapshot {
            &self.snapshot
        }

        fn suspend(&mut self) -> Result<()> {
            self.log.push("suspend".into());
            if self.fail_suspend {
                return Err(DeviceError::HandshakeFailed("asleep".into()));
            }
            Ok(())
        }

        fn resume(&mut self) -> Result<()> {
            self.log.push("resume".into());
            Ok(())
        }

        fn write_group(&mut self, group: Group, desired: &Snapshot) -> Result<()> {
            self.log.push(format!("write {group:?}"));
            if self.fail_on == Some(group) {
                return Err(DeviceError::invalid("readback", "mismatch"));
            }
            match group {
                Group::A => self.snapshot.a = desired.a,
                Group::B => self.snapshot.b = desired.b,
                Group::C => self.snapshot.c = desired.c,
            }
            Ok(())
        }

        fn persist(&mut self) -> Result<()> {
            self.log.push("persist".into());
            Ok(())
        }
    }

    fn set_c(s: &mut Snapshot) -> Result<()> {
        s.c = 3;
        Ok(())
    }

    fn set_a(s: &mut Snapshot) -> Result<()> {
        s.a = 1;
        Ok(())
    }

    #[test]
    fn only_touched_groups_are_written_in_commit_order() {
        let mut dev = Recorder::default();
        {
            let mut session = Session::open(&mut dev);
            session.update(Group::C, set_c).update(Group::A, set_a);
            assert_eq!(session.changed_groups(), vec![Group::A, Group::C]);
            session.end().expect("should commit");
        }
        assert_eq!(
            dev.log,
            vec!["suspend", "write A", "write C", "persist", "resume"]
        );
        assert_eq!(dev.snapshot, Snapshot { a: 1, b: 0, c: 3 });
    }

    #[test]
    fn nothing_changed_means_no_writes_and_no_persist() {
        let mut dev = Recorder::default();
        Session::open(&mut dev).end().expect("should commit");
        assert_eq!(dev.log, vec!["suspend", "resume"]);
    }

    #[test]
    fn second_end_is_rejected_without_side_effects() {
        let mut dev = Recorder::default();
        {
            let mut session = Session::open(&mut dev);
            session.end().expect("should commit");
            let err = session.end().expect_err("should fail to commit");
            assert!(matches!(err, DeviceError::SessionClosed));
            assert_eq!(session.state(), SessionState::Closed);
        }
        assert_eq!(dev.log, vec!["suspend", "resume"]);
    }

    #[test]
    fn failed_commit_still_resumes() {
        let mut dev = Recorder {
            fail_on: Some(Group::A),
            ..Recorder::default()
        };
        let err = {
            let mut session = Session::open(&mut dev);
            session.update(Group::A, set_a).update(Group::C, set_c);
            session.end().expect_err("should fail to commit")
        };
        assert!(matches!(err, DeviceError::InvalidValue { location: "readback", .. }));
        assert_eq!(dev.log, vec!["suspend", "write A", "resume"]);
        assert_eq!(dev.snapshot, Snapshot::default());
    }

    #[test]
    fn poisoned_session_ignores_setters_and_skips_commit() {
        let mut dev = Recorder::default();
        let err = {
            let mut session = Session::open(&mut dev);
            session
                .update(Group::B, |_| Err(DeviceError::invalid("b", 200)))
                .update(Group::A, set_a);
            assert!(session.is_poisoned());
            assert_eq!(session.working().a, 0);
            assert!(session.changed_groups().is_empty());
            session.end().expect_err("should fail to commit")
        };
        assert!(matches!(err, DeviceError::InvalidValue { location: "b", .. }));
        assert_eq!(dev.log, vec!["suspend", "resume"]);
    }

    #[test]
    fn suspend_failure_is_carried_but_changes_still_commit() {
        let mut dev = Recorder {
            fail_suspend: true,
            ..Recorder::default()
        };
        let err = {
            let mut session = Session::open(&mut dev);
            session.update(Group::B, |s| {
                s.b = 2;
                Ok(())
            });
            session.end().expect_err("should fail to commit")
        };
        assert!(matches!(err, DeviceError::HandshakeFailed(_)));
        assert_eq!(dev.log, vec!["suspend", "write B", "persist", "resume"]);
        assert_eq!(dev.snapshot.b, 2);
    }

    #[test]
    fn drop_ends_an_open_session() {
        let mut dev = Recorder::default();
        {
            let mut session = Session::open(&mut dev);
            session.update(Group::B, |s| {
                s.b = 9;
                Ok(())
            });
        }
        assert_eq!(dev.log, vec!["suspend", "write B", "persist", "resume"]);
        assert_eq!(dev.snapshot.b, 9);
    }
}
