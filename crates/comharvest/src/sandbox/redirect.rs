//! Hive redirection with rollback.
//!
//! A [`Redirector`] owns the hive backend and a guard flag. Only one
//! [`RedirectionContext`] can be live per redirector; the context restores
//! every override and deletes its private subtree when ended or dropped.
//!
//! Install order keeps the override root itself for last, because the
//! private keys for the other roots live beneath it. Teardown runs in the
//! exact reverse order.

use crate::error::{HarvestError, HarvestResult};
use comreg::LogicalRoot;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Process-level operations on the predefined roots.
pub trait HiveBackend: Send + Sync {
    /// Delete `path` under `base` and everything beneath it. An absent key
    /// is not an error.
    fn delete_tree(&self, base: LogicalRoot, path: &str) -> HarvestResult<()>;

    /// Create `path` under `base`, including missing ancestors.
    fn create_key(&self, base: LogicalRoot, path: &str) -> HarvestResult<()>;

    /// Redirect `root` to the key `path` under `base`.
    fn override_root(&self, root: LogicalRoot, base: LogicalRoot, path: &str) -> HarvestResult<()>;

    /// Undo a redirection of `root`.
    fn restore_root(&self, root: LogicalRoot) -> HarvestResult<()>;
}

/// Where a context keeps its private keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayout {
    /// Root that hosts the private subtree.
    pub override_root: LogicalRoot,
    /// Key path of the private subtree under `override_root`.
    pub private_path: String,
}

impl SandboxLayout {
    pub fn new(override_root: LogicalRoot, private_root: &str, scope: &str) -> Self {
        let private_root = private_root.trim_matches('\\');
        SandboxLayout {
            override_root,
            private_path: format!("{}\\{}", private_root, sanitize_scope(scope)),
        }
    }

    /// Private key that stands in for `root`.
    pub fn redirected_path(&self, root: LogicalRoot) -> String {
        format!("{}\\{}", self.private_path, root.hive_name())
    }

    /// Roots in install order: every other root first, the override root last.
    pub fn install_order(&self) -> Vec<LogicalRoot> {
        LogicalRoot::ALL
            .into_iter()
            .filter(|&r| r != self.override_root)
            .chain(std::iter::once(self.override_root))
            .collect()
    }
}

/// Reduce a scope identifier to a single key-name segment.
fn sanitize_scope(scope: &str) -> String {
    let cleaned: String = scope
        .chars()
        .map(|c| if c == '\\' || c == '/' || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

/// Owner of the hive backend and the single-active-context guard.
pub struct Redirector<B: HiveBackend> {
    backend: B,
    active: AtomicBool,
}

impl<B: HiveBackend> Redirector<B> {
    pub fn new(backend: B) -> Self {
        Redirector {
            backend,
            active: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Create the private subtree and redirect all four roots into it.
    ///
    /// Fails with [`HarvestError::AlreadyActive`] while another context from
    /// this redirector is live. On any other failure every override that was
    /// applied is restored before the error is returned.
    pub fn begin(&self, layout: SandboxLayout) -> HarvestResult<RedirectionContext<'_, B>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HarvestError::AlreadyActive);
        }

        let mut context = RedirectionContext {
            redirector: self,
            layout,
            applied: Vec::new(),
            ended: false,
        };
        match context.install() {
            Ok(()) => Ok(context),
            Err(e) => {
                if let Err(rollback) = context.teardown() {
                    error!("sandbox: rollback after failed install also failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

/// A live redirection. Ends on [`RedirectionContext::end`] or on drop.
pub struct RedirectionContext<'a, B: HiveBackend> {
    redirector: &'a Redirector<B>,
    layout: SandboxLayout,
    /// Roots overridden so far, in install order.
    applied: Vec<LogicalRoot>,
    ended: bool,
}

impl<B: HiveBackend> RedirectionContext<'_, B> {
    pub fn layout(&self) -> &SandboxLayout {
        &self.layout
    }

    pub fn overridden(&self) -> &[LogicalRoot] {
        &self.applied
    }

    fn install(&mut self) -> HarvestResult<()> {
        let backend = &self.redirector.backend;
        let base = self.layout.override_root;

        debug!(
            "sandbox: preparing {}\\{}",
            base, self.layout.private_path
        );
        backend
            .delete_tree(base, &self.layout.private_path)
            .map_err(|e| HarvestError::sandbox_prepare(&self.layout.private_path, e.to_string()))?;
        for root in LogicalRoot::ALL {
            let path = self.layout.redirected_path(root);
            backend
                .create_key(base, &path)
                .map_err(|e| HarvestError::sandbox_prepare(&path, e.to_string()))?;
        }

        for root in self.layout.install_order() {
            let path = self.layout.redirected_path(root);
            backend
                .override_root(root, base, &path)
                .map_err(|e| HarvestError::sandbox_install(root, e.to_string()))?;
            debug!("sandbox: {} -> {}\\{}", root, base, path);
            self.applied.push(root);
        }
        Ok(())
    }

    /// Restore overrides in reverse order and delete the private subtree.
    fn teardown(&mut self) -> HarvestResult<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        let backend = &self.redirector.backend;
        let mut failures = Vec::new();
        while let Some(root) = self.applied.pop() {
            match backend.restore_root(root) {
                Ok(()) => debug!("sandbox: restored {}", root),
                Err(e) => failures.push(format!("{}: {}", root, e)),
            }
        }
        if let Err(e) = backend.delete_tree(self.layout.override_root, &self.layout.private_path) {
            failures.push(format!("{}: {}", self.layout.private_path, e));
        }
        self.redirector.active.store(false, Ordering::Release);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarvestError::SandboxTeardown(failures.join("; ")))
        }
    }

    /// End the redirection, reporting teardown failures.
    pub fn end(mut self) -> HarvestResult<()> {
        self.teardown()
    }
}

impl<B: HiveBackend> Drop for RedirectionContext<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            error!("sandbox: teardown on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Delete(LogicalRoot, String),
        Create(LogicalRoot, String),
        Override(LogicalRoot),
        Restore(LogicalRoot),
    }

    /// Records calls; can be told to fail overriding or restoring one root.
    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Mutex<Vec<Call>>,
        pub fail_override: Option<LogicalRoot>,
        pub fail_restore: Option<LogicalRoot>,
    }

    impl FakeBackend {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn overridden(&self) -> Vec<LogicalRoot> {
            let mut live = Vec::new();
            for call in self.calls() {
                match call {
                    Call::Override(r) => live.push(r),
                    Call::Restore(r) => live.retain(|&x| x != r),
                    _ => {}
                }
            }
            live
        }
    }

    impl HiveBackend for FakeBackend {
        fn delete_tree(&self, base: LogicalRoot, path: &str) -> HarvestResult<()> {
            self.calls.lock().push(Call::Delete(base, path.to_string()));
            Ok(())
        }

        fn create_key(&self, base: LogicalRoot, path: &str) -> HarvestResult<()> {
            self.calls.lock().push(Call::Create(base, path.to_string()));
            Ok(())
        }

        fn override_root(&self, root: LogicalRoot, _base: LogicalRoot, _path: &str) -> HarvestResult<()> {
            if self.fail_override == Some(root) {
                return Err(HarvestError::Registry(format!("cannot override {}", root)));
            }
            self.calls.lock().push(Call::Override(root));
            Ok(())
        }

        fn restore_root(&self, root: LogicalRoot) -> HarvestResult<()> {
            if self.fail_restore == Some(root) {
                return Err(HarvestError::Registry(format!("cannot restore {}", root)));
            }
            self.calls.lock().push(Call::Restore(root));
            Ok(())
        }
    }

    fn layout(root: LogicalRoot) -> SandboxLayout {
        SandboxLayout::new(root, "Software\\ComHarvest\\Capture", "scope1")
    }

    fn overrides(calls: &[Call]) -> Vec<Call> {
        calls
            .iter()
            .filter(|c| matches!(c, Call::Override(_) | Call::Restore(_)))
            .cloned()
            .collect()
    }

    #[test]
    fn test_override_root_installed_last_and_restored_first() {
        let redirector = Redirector::new(FakeBackend::default());
        let ctx = redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap();
        assert_eq!(redirector.backend().overridden().len(), 4);
        ctx.end().unwrap();

        use LogicalRoot::*;
        assert_eq!(
            overrides(&redirector.backend().calls()),
            vec![
                Call::Override(ClassesRoot),
                Call::Override(LocalMachine),
                Call::Override(Users),
                Call::Override(CurrentUser),
                Call::Restore(CurrentUser),
                Call::Restore(Users),
                Call::Restore(LocalMachine),
                Call::Restore(ClassesRoot),
            ]
        );
        assert!(redirector.backend().overridden().is_empty());
    }

    #[test]
    fn test_legacy_layout_uses_local_machine() {
        let l = layout(LogicalRoot::LocalMachine);
        assert_eq!(*l.install_order().last().unwrap(), LogicalRoot::LocalMachine);
        assert_eq!(
            l.redirected_path(LogicalRoot::ClassesRoot),
            "Software\\ComHarvest\\Capture\\scope1\\HKEY_CLASSES_ROOT"
        );
    }

    #[test]
    fn test_stale_state_deleted_before_create() {
        let redirector = Redirector::new(FakeBackend::default());
        drop(redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap());
        let calls = redirector.backend().calls();
        assert_eq!(
            calls[0],
            Call::Delete(LogicalRoot::CurrentUser, "Software\\ComHarvest\\Capture\\scope1".into())
        );
        assert!(matches!(calls[1], Call::Create(..)));
        // Drop also tore down and deleted the subtree.
        assert!(matches!(calls.last(), Some(Call::Delete(..))));
    }

    #[test]
    fn test_second_begin_fails_while_active() {
        let redirector = Redirector::new(FakeBackend::default());
        let ctx = redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap();
        assert!(matches!(
            redirector.begin(layout(LogicalRoot::CurrentUser)),
            Err(HarvestError::AlreadyActive)
        ));
        ctx.end().unwrap();
        assert!(!redirector.is_active());
        redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap().end().unwrap();
    }

    #[test]
    fn test_failed_install_rolls_back() {
        let backend = FakeBackend {
            fail_override: Some(LogicalRoot::Users),
            ..Default::default()
        };
        let redirector = Redirector::new(backend);
        let err = redirector.begin(layout(LogicalRoot::CurrentUser)).err().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, HarvestError::SandboxInstall { root: LogicalRoot::Users, .. }));
        assert!(redirector.backend().overridden().is_empty());
        assert!(!redirector.is_active());
        use LogicalRoot::*;
        assert_eq!(
            overrides(&redirector.backend().calls()),
            vec![
                Call::Override(ClassesRoot),
                Call::Override(LocalMachine),
                Call::Restore(LocalMachine),
                Call::Restore(ClassesRoot),
            ]
        );
    }

    #[test]
    fn test_failed_restore_continues_and_is_fatal() {
        let backend = FakeBackend {
            fail_restore: Some(LogicalRoot::Users),
            ..Default::default()
        };
        let redirector = Redirector::new(backend);
        let ctx = redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap();
        let err = ctx.end().err().unwrap();

        assert!(matches!(err, HarvestError::SandboxTeardown(_)));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("cannot restore HKU"));
        assert!(!redirector.is_active());

        use LogicalRoot::*;
        let calls = redirector.backend().calls();
        assert_eq!(
            overrides(&calls)[4..],
            [
                Call::Restore(CurrentUser),
                Call::Restore(LocalMachine),
                Call::Restore(ClassesRoot),
            ]
        );
        // The private subtree is still deleted.
        assert!(matches!(calls.last(), Some(Call::Delete(CurrentUser, _))));
    }

    #[test]
    fn test_failed_restore_on_drop_clears_guard() {
        let backend = FakeBackend {
            fail_restore: Some(LogicalRoot::ClassesRoot),
            ..Default::default()
        };
        let redirector = Redirector::new(backend);
        drop(redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap());
        assert!(!redirector.is_active());
        redirector.begin(layout(LogicalRoot::CurrentUser)).unwrap().end().err().unwrap();
    }

    #[test]
    fn test_scope_is_single_segment() {
        let l = SandboxLayout::new(LogicalRoot::CurrentUser, "Software\\X\\", "a\\b");
        assert_eq!(l.private_path, "Software\\X\\a_b");
    }
}
