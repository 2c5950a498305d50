//! Node selection policy.

use tonearm_common::NodeId;

use crate::node::NodeSnapshot;

/// Pick a node for a new or moving session.
///
/// Only connected, non-draining nodes other than `exclude` qualify. Nodes in
/// `region` win over the rest; within a group the fewest players wins and
/// ties go to the earlier node. Returns the index into `nodes`.
pub fn select_node(
    nodes: &[NodeSnapshot],
    region: Option<&str>,
    exclude: Option<&NodeId>,
) -> Option<usize> {
    let candidates: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.connected && !n.draining && Some(&n.id) != exclude)
        .map(|(i, _)| i)
        .collect();
    let least_loaded = |group: &[usize]| group.iter().copied().min_by_key(|&i| nodes[i].players);

    if let Some(region) = region {
        let regional: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| {
                nodes[i]
                    .region
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(region))
            })
            .collect();
        if let Some(best) = least_loaded(&regional) {
            return Some(best);
        }
    }
    least_loaded(&candidates)
}
