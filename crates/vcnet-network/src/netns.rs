//! Network namespace execution.
//!
//! The network namespace is a property of the calling OS thread. Operations
//! are therefore run on a dedicated, short-lived thread that switches into
//! the target namespace, runs the operation and switches back before it
//! exits. No pooled thread (tokio worker or otherwise) ever observes a
//! foreign namespace.

use std::fs::File;
use std::io::ErrorKind;
use std::os::fd::AsFd;
use std::path::Path;

use rustix::thread::{LinkNameSpaceType, move_into_link_name_space};
use vcnet_common::{VcError, VcResult};

/// Namespace of the current thread.
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// An operation to run inside a namespace.
pub type NsOp<'a> = Box<dyn FnOnce() -> VcResult<()> + Send + 'a>;

/// Runs operations inside a network namespace.
pub trait NamespaceExecutor: Send + Sync {
    /// Run `op` inside the namespace bound at `path`.
    ///
    /// Returns [`VcError::NetnsNotFound`] without running `op` when `path`
    /// does not exist.
    fn execute(&self, path: &Path, op: NsOp<'_>) -> VcResult<()>;
}

/// Executor that switches namespaces with `setns(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostNamespaceExecutor;

impl NamespaceExecutor for HostNamespaceExecutor {
    fn execute(&self, path: &Path, op: NsOp<'_>) -> VcResult<()> {
        run_in_netns(path, op)
    }
}

/// Run `f` inside the network namespace bound at `path`.
pub fn run_in_netns<T, F>(path: &Path, f: F) -> VcResult<T>
where
    T: Send,
    F: FnOnce() -> VcResult<T> + Send,
{
    let target = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(VcError::NetnsNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(netns = %path.display(), "Entering network namespace");

    std::thread::scope(|scope| {
        let worker = scope.spawn(move || {
            let _guard = NetnsGuard::enter(&target)?;
            f()
        });

        worker.join().unwrap_or_else(|_| {
            Err(VcError::Internal {
                message: format!("operation in netns {} panicked", path.display()),
            })
        })
    })
}

/// Holds the thread inside a foreign namespace; switches back on drop.
struct NetnsGuard {
    original: File,
}

impl NetnsGuard {
    fn enter(target: &File) -> VcResult<Self> {
        let original = File::open(THREAD_NETNS)?;
        switch_to(target)?;
        Ok(Self { original })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(e) = switch_to(&self.original) {
            // The worker thread exits right after, taking the namespace with it.
            tracing::error!(error = %e, "Failed to restore original network namespace");
        }
    }
}

fn switch_to(ns: &File) -> VcResult<()> {
    move_into_link_name_space(ns.as_fd(), Some(LinkNameSpaceType::Network)).map_err(|e| {
        if e == rustix::io::Errno::PERM {
            VcError::PermissionDenied {
                operation: "setns(CLONE_NEWNET)".to_string(),
            }
        } else {
            VcError::Internal {
                message: format!("setns failed: {e}"),
            }
        }
    })
}
