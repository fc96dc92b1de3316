use model::record::EmployeeRecord;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Orders new employees into creation batches so that hard references
/// (manager, matrix manager) point at employees created in an earlier batch.
///
/// The HR reference is soft: it never delays a batch, but users whose HR
/// manager is created in the same run are flagged so the relationship stages
/// can be replayed once the HR manager exists.
pub struct CreationOrderResolver {
    records: Vec<EmployeeRecord>,
    new_ids: BTreeSet<String>,
    existing_ids: BTreeSet<String>,
}

/// One creation batch. All hard references of its records resolve to earlier
/// batches or to already-existing employees.
#[derive(Debug, Clone)]
pub struct OrderedBatch {
    pub records: Vec<EmployeeRecord>,
    /// Users in this batch whose HR manager is also created in this run.
    pub hr_retry: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingDependency {
    pub userid: String,
    pub field: String,
    pub missing: String,
}

/// Diagnostic view of the dependency graph, for run reports.
#[derive(Debug, Clone, Serialize)]
pub struct DependencySummary {
    pub total_new_employees: usize,
    pub employees_with_no_dependencies: usize,
    pub employees_with_dependencies: usize,
    pub employees_in_hard_cycles: usize,
    pub hard_cycle_userids: Vec<String>,
    pub hard_cycle_groups: Vec<Vec<String>>,
    pub missing_hard_dependencies: Vec<MissingDependency>,
    pub hr_retry_candidates: Vec<String>,
}

impl CreationOrderResolver {
    /// `existing_ids` are employees already present in the target system.
    /// User ids are compared case-insensitively throughout.
    pub fn new(records: Vec<EmployeeRecord>, existing_ids: BTreeSet<String>) -> Self {
        let records: Vec<EmployeeRecord> = records
            .into_iter()
            .map(|mut r| {
                r.userid = r.userid.trim().to_lowercase();
                r
            })
            .collect();
        let new_ids = records.iter().map(|r| r.userid.clone()).collect();
        let existing_ids = existing_ids
            .into_iter()
            .map(|id| id.trim().to_lowercase())
            .collect();
        CreationOrderResolver {
            records,
            new_ids,
            existing_ids,
        }
    }

    fn hard_dependencies(&self, record: &EmployeeRecord) -> BTreeSet<String> {
        [record.manager(), record.matrix_manager()]
            .into_iter()
            .flatten()
            .map(str::to_lowercase)
            .filter(|dep| dep != &record.userid && self.new_ids.contains(dep))
            .collect()
    }

    fn hr_retry_candidates(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| {
                r.hr()
                    .map(str::to_lowercase)
                    .is_some_and(|hr| hr != r.userid && self.new_ids.contains(&hr))
            })
            .map(|r| r.userid.clone())
            .collect()
    }

    /// Resolves the batch order. Hard cycles never abort the run: cycle
    /// members have the offending references cleared and are emitted together
    /// as the final batch.
    pub fn resolve(&self) -> Vec<OrderedBatch> {
        let deps: BTreeMap<String, BTreeSet<String>> = self
            .records
            .iter()
            .map(|r| (r.userid.clone(), self.hard_dependencies(r)))
            .collect();
        let hr_candidates = self.hr_retry_candidates();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for (user, user_deps) in &deps {
            in_degree.insert(user, user_deps.len());
            for dep in user_deps {
                dependents.entry(dep).or_default().push(user);
            }
        }

        let mut remaining: BTreeSet<&str> =
            self.records.iter().map(|r| r.userid.as_str()).collect();
        let mut batches = Vec::new();

        loop {
            let ready: Vec<&EmployeeRecord> = self
                .records
                .iter()
                .filter(|r| {
                    remaining.contains(r.userid.as_str())
                        && in_degree.get(r.userid.as_str()).copied().unwrap_or(0) == 0
                })
                .collect();
            if ready.is_empty() {
                break;
            }
            for record in &ready {
                remaining.remove(record.userid.as_str());
                if let Some(users) = dependents.get(record.userid.as_str()) {
                    for user in users {
                        if let Some(count) = in_degree.get_mut(user) {
                            *count = count.saturating_sub(1);
                        }
                    }
                }
            }
            batches.push(self.batch_from(ready.into_iter().cloned().collect(), &hr_candidates));
        }

        if !remaining.is_empty() {
            let groups = cycle_groups(&remaining, &deps);
            for group in &groups {
                warn!(
                    "Hard dependency cycle detected, clearing references within it: {}",
                    group.join(", ")
                );
            }
            let leftover: Vec<EmployeeRecord> = self
                .records
                .iter()
                .filter(|r| remaining.contains(r.userid.as_str()))
                .map(|r| {
                    let mut cleared = r.clone();
                    for field in [&mut cleared.manager, &mut cleared.matrix_manager] {
                        let points_into_cycle = field
                            .as_deref()
                            .is_some_and(|v| remaining.contains(v.trim().to_lowercase().as_str()));
                        if points_into_cycle {
                            *field = None;
                        }
                    }
                    cleared
                })
                .collect();
            batches.push(self.batch_from(leftover, &hr_candidates));
        }

        info!(
            "Resolved {} employees into {} creation batches",
            self.records.len(),
            batches.len()
        );
        batches
    }

    fn batch_from(
        &self,
        records: Vec<EmployeeRecord>,
        hr_candidates: &BTreeSet<String>,
    ) -> OrderedBatch {
        let hr_retry = records
            .iter()
            .filter(|r| hr_candidates.contains(&r.userid))
            .map(|r| r.userid.clone())
            .collect();
        OrderedBatch { records, hr_retry }
    }

    pub fn dependency_summary(&self) -> DependencySummary {
        let deps: BTreeMap<String, BTreeSet<String>> = self
            .records
            .iter()
            .map(|r| (r.userid.clone(), self.hard_dependencies(r)))
            .collect();

        let with_dependencies = deps.values().filter(|d| !d.is_empty()).count();

        let remaining = leftover_after_kahn(&deps);
        let remaining_refs: BTreeSet<&str> = remaining.iter().map(String::as_str).collect();
        let groups = cycle_groups(&remaining_refs, &deps);
        let hard_cycle_userids: Vec<String> = {
            let mut ids: Vec<String> = groups.iter().flatten().cloned().collect();
            ids.sort();
            ids
        };

        let mut missing_hard_dependencies = Vec::new();
        for record in &self.records {
            for (field, value) in [
                ("manager", record.manager()),
                ("matrix_manager", record.matrix_manager()),
            ] {
                if let Some(target) = value.map(str::to_lowercase) {
                    if target != record.userid
                        && !self.new_ids.contains(&target)
                        && !self.existing_ids.contains(&target)
                    {
                        missing_hard_dependencies.push(MissingDependency {
                            userid: record.userid.clone(),
                            field: field.to_string(),
                            missing: target,
                        });
                    }
                }
            }
        }

        DependencySummary {
            total_new_employees: self.records.len(),
            employees_with_no_dependencies: self.records.len() - with_dependencies,
            employees_with_dependencies: with_dependencies,
            employees_in_hard_cycles: hard_cycle_userids.len(),
            hard_cycle_userids,
            hard_cycle_groups: groups,
            missing_hard_dependencies,
            hr_retry_candidates: self.hr_retry_candidates().into_iter().collect(),
        }
    }
}

/// Runs the same level-batching as `resolve` but only reports which users can
/// never be scheduled, i.e. sit in or behind a hard cycle.
fn leftover_after_kahn(deps: &BTreeMap<String, BTreeSet<String>>) -> BTreeSet<String> {
    let mut in_degree: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(user, d)| (user.as_str(), d.len()))
        .collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (user, user_deps) in deps {
        for dep in user_deps {
            dependents.entry(dep).or_default().push(user);
        }
    }
    let mut remaining: BTreeSet<&str> = deps.keys().map(String::as_str).collect();
    loop {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|user| in_degree.get(**user).copied().unwrap_or(0) == 0)
            .copied()
            .collect();
        if ready.is_empty() {
            break;
        }
        for user in ready {
            remaining.remove(user);
            if let Some(users) = dependents.get(user) {
                for dependent in users {
                    if let Some(count) = in_degree.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
    }
    remaining.into_iter().map(str::to_string).collect()
}

/// Strongly connected components of the leftover subgraph, restricted to
/// groups that actually form a cycle. Groups are sorted internally and by
/// descending size for stable reporting.
fn cycle_groups(
    remaining: &BTreeSet<&str>,
    deps: &BTreeMap<String, BTreeSet<String>>,
) -> Vec<Vec<String>> {
    let nodes: Vec<&str> = remaining.iter().copied().collect();
    let index_of: BTreeMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (*node, idx))
        .collect();
    let adjacency: Vec<Vec<usize>> = nodes
        .iter()
        .map(|node| {
            deps.get(*node)
                .into_iter()
                .flatten()
                .filter_map(|dep| index_of.get(dep.as_str()).copied())
                .collect()
        })
        .collect();

    let mut groups: Vec<Vec<String>> = tarjan_components(&adjacency)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&v| adjacency[v].contains(&v))
        })
        .map(|component| {
            let mut group: Vec<String> = component
                .into_iter()
                .map(|idx| nodes[idx].to_string())
                .collect();
            group.sort();
            group
        })
        .collect();
    groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    groups
}

fn tarjan_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];
        while let Some(frame) = frames.last_mut() {
            let (v, cursor) = *frame;
            if cursor == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if cursor < adjacency[v].len() {
                frame.1 += 1;
                let w = adjacency[v][cursor];
                if index[w] == UNVISITED {
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                frames.pop();
                if let Some(parent) = frames.last() {
                    let p = parent.0;
                    lowlink[p] = lowlink[p].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
    }
    components
}
