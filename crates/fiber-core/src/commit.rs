//! Applies the effects of a finished work tree to the host.

use crate::diff::apply_props;
use crate::element::Props;
use crate::fiber::{EffectTag, FiberId, FiberTree};
use crate::host::{HostAdapter, NodeError};

/// Counts of the effects applied by one commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Detaches the host nodes of a deleted fiber from their host parent.
pub(crate) fn commit_deletion<A: HostAdapter + ?Sized>(
    tree: &FiberTree,
    host: &mut A,
    id: FiberId,
    stats: &mut CommitStats,
) -> Result<(), NodeError> {
    let Some(parent) = tree.host_parent(id) else {
        return Ok(());
    };
    for node in tree.nearest_host_nodes(id) {
        host.remove_child(parent, node)?;
        stats.removed += 1;
    }
    Ok(())
}

/// Walks the finished tree under `root` in pre-order, applying Add and Update
/// effects and settling the hook records of every committed component.
pub(crate) fn commit_work<A: HostAdapter + ?Sized>(
    tree: &FiberTree,
    host: &mut A,
    root: FiberId,
    stats: &mut CommitStats,
) -> Result<(), NodeError> {
    let empty = Props::default();
    for id in tree.descendants(root).into_iter().skip(1) {
        let Some(fiber) = tree.get(id) else {
            continue;
        };
        match (fiber.effect, fiber.host_node) {
            (Some(EffectTag::Add), Some(node)) => {
                if let Some(parent) = tree.host_parent(id) {
                    host.append_child(parent, node)?;
                    stats.added += 1;
                }
            }
            (Some(EffectTag::Update), Some(node)) => {
                let previous = fiber
                    .alternate
                    .and_then(|alternate| tree.get(alternate))
                    .map(|alternate| alternate.props())
                    .unwrap_or(&empty);
                apply_props(host, Some(node), previous, fiber.props())?;
                stats.updated += 1;
            }
            _ => {}
        }
        for hook in &fiber.hooks {
            hook.commit();
        }
    }
    Ok(())
}
