use std::future::Future;

use dbmux::condition::{Cond, Condition};

#[derive(Debug, Clone)]
pub(crate) struct ShrinkReport {
    pub(crate) original_nodes: usize,
    pub(crate) shrunk_nodes: usize,
    pub(crate) attempts: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ShrinkResult {
    pub(crate) condition: Condition,
    pub(crate) report: ShrinkReport,
}

pub(crate) fn node_count(condition: &Condition) -> usize {
    match condition {
        Condition::And(children) | Condition::Or(children) => {
            1 + children.iter().map(node_count).sum::<usize>()
        }
        Condition::Cond(cond) => cond.len().max(1),
        _ => 1,
    }
}

/// Smaller neighbours of `condition`: each child on its own, the node without one child,
/// and the node with one child shrunk in place.
fn candidates(condition: &Condition) -> Vec<Condition> {
    let mut out = Vec::new();
    match condition {
        Condition::And(children) | Condition::Or(children) => {
            let rebuild = |kids: Vec<Condition>| match condition {
                Condition::And(_) => Condition::And(kids),
                _ => Condition::Or(kids),
            };
            out.extend(children.iter().cloned());
            for skip in 0..children.len() {
                let kids = children
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, c)| c.clone())
                    .collect::<Vec<_>>();
                if !kids.is_empty() {
                    out.push(rebuild(kids));
                }
            }
            for (i, child) in children.iter().enumerate() {
                for smaller in candidates(child) {
                    let mut kids = children.clone();
                    kids[i] = smaller;
                    out.push(rebuild(kids));
                }
            }
        }
        Condition::Cond(cond) if cond.len() > 1 => {
            for skip in 0..cond.len() {
                let mut kept = Cond::new();
                for (i, c) in cond.constraints().iter().enumerate() {
                    if i != skip {
                        kept = kept.push(c.column.clone(), c.op, c.value.clone());
                    }
                }
                out.push(kept.into());
            }
        }
        _ => {}
    }
    out
}

/// Greedily replace `condition` with smaller trees for which `still_fails` holds.
pub(crate) async fn shrink_condition<F, Fut>(
    condition: Condition,
    max_attempts: usize,
    still_fails: F,
) -> ShrinkResult
where
    F: Fn(Condition) -> Fut,
    Fut: Future<Output = bool>,
{
    let original_nodes = node_count(&condition);
    let mut current = condition;
    let mut attempts = 0usize;

    'outer: while attempts < max_attempts {
        let mut options = candidates(&current);
        options.sort_by_key(node_count);
        for candidate in options {
            if node_count(&candidate) >= node_count(&current) {
                continue;
            }
            attempts += 1;
            if still_fails(candidate.clone()).await {
                current = candidate;
                continue 'outer;
            }
            if attempts >= max_attempts {
                break;
            }
        }
        break;
    }

    ShrinkResult {
        report: ShrinkReport {
            original_nodes,
            shrunk_nodes: node_count(&current),
            attempts,
        },
        condition: current,
    }
}

#[cfg(test)]
mod tests {
    use dbmux::condition::{and, or};

    use super::*;

    #[tokio::test]
    async fn shrinks_to_the_failing_leaf() {
        let culprit: Condition = Cond::new().eq("color", "red").into();
        let tree = and([
            or([Cond::new().gt("n", 1).into(), culprit.clone()]),
            Condition::from(Cond::new().eq("flag", true)),
        ]);
        let target = culprit.clone();
        let result = shrink_condition(tree, 100, |c| {
            let hit = contains(&c, &target);
            async move { hit }
        })
        .await;
        assert_eq!(result.condition, culprit);
        assert!(result.report.shrunk_nodes < result.report.original_nodes);
    }

    fn contains(haystack: &Condition, needle: &Condition) -> bool {
        haystack == needle
            || match haystack {
                Condition::And(children) | Condition::Or(children) => {
                    children.iter().any(|c| contains(c, needle))
                }
                _ => false,
            }
    }
}
