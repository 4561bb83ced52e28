//! Structural diff between desired and current state

use std::collections::BTreeSet;

use similar::TextDiff;
use tracing::info;

use landskip_core::{Component, Components};

use crate::error::Result;

/// The operations needed to get from current to desired
#[derive(Debug, Default, Clone)]
pub struct Plan {
    /// In desired, not in current
    pub create: Components,
    /// In both, not equal; keyed to the desired component
    pub update: Components,
    /// In current, not in desired
    pub delete: Components,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Partition desired vs current into create, update and delete sets
pub fn diff(desired: &Components, current: &Components) -> Plan {
    let mut plan = Plan::default();

    for (name, desired_cmp) in desired {
        match current.get(name) {
            Some(current_cmp) => {
                if !desired_cmp.equals(current_cmp) {
                    plan.update.insert(name.clone(), desired_cmp.clone());
                }
            }
            None => {
                plan.create.insert(name.clone(), desired_cmp.clone());
            }
        }
    }

    for (name, current_cmp) in current {
        if !desired.contains_key(name) {
            plan.delete.insert(name.clone(), current_cmp.clone());
        }
    }

    plan
}

/// Whether two components differ in their secret values and nothing else
pub fn is_only_secret_value_diff(a: &Component, b: &Component) -> bool {
    a.secret_values != b.secret_values && a.equals_except_secret_values(b)
}

/// Updates that must run as a delete-then-create pair.
///
/// Secret-value-only changes force a replacement so pods restart with the
/// new bytes; the package manager cannot move a release across namespaces.
pub fn forced_updates(plan: &Plan, current: &Components) -> BTreeSet<String> {
    let mut forced = BTreeSet::new();

    for (name, desired_cmp) in &plan.update {
        let Some(current_cmp) = current.get(name) else {
            continue;
        };
        if is_only_secret_value_diff(current_cmp, desired_cmp) {
            info!(
                component = %name,
                "differs in secret values only; delete + create instead of update"
            );
            forced.insert(name.clone());
        } else if current_cmp.namespace != desired_cmp.namespace {
            info!(
                component = %name,
                from = %current_cmp.namespace,
                to = %desired_cmp.namespace,
                "namespace changed; delete + create instead of update"
            );
            forced.insert(name.clone());
        }
    }

    forced
}

/// Move forced updates out of `update`: the current component joins
/// `delete`, the desired one joins `create`. Applying this twice is a
/// no-op for the second application.
pub fn promote_forced(mut plan: Plan, current: &Components, forced: &BTreeSet<String>) -> Plan {
    for name in forced {
        let Some(desired_cmp) = plan.update.remove(name) else {
            continue;
        };
        if let Some(current_cmp) = current.get(name) {
            plan.delete.insert(name.clone(), current_cmp.clone());
        }
        plan.create.insert(name.clone(), desired_cmp);
    }
    plan
}

/// Render a unified diff between two component renditions. `None` marks
/// non-existence, so (None, Some) reads as a create. Secret values never
/// appear: they are not part of a component's serialised form.
pub fn component_diff_text(
    current: Option<&Component>,
    desired: Option<&Component>,
) -> Result<String> {
    let (current_text, current_name) = match current {
        Some(cmp) => (
            serde_json::to_string_pretty(cmp).map_err(landskip_core::CoreError::from)? + "\n",
            cmp.name.clone(),
        ),
        None => (String::new(), "<none>".to_string()),
    };
    let (desired_text, desired_name) = match desired {
        Some(cmp) => (
            serde_json::to_string_pretty(cmp).map_err(landskip_core::CoreError::from)? + "\n",
            cmp.name.clone(),
        ),
        None => (String::new(), "<none>".to_string()),
    };

    let diff = TextDiff::from_lines(current_text.as_str(), desired_text.as_str());
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header(
            &format!("Current {}", current_name),
            &format!("Desired {}", desired_name),
        )
        .to_string())
}

/// Log the plan: one line per delete, a unified diff per create/update.
/// Secret changes are only ever announced, never rendered.
pub fn log_differences(current: &Components, plan: &Plan) -> Result<()> {
    for name in plan.delete.keys() {
        info!("Delete: {}", name);
    }

    for (name, cmp) in &plan.create {
        info!("Create: {}", name);
        let diff = component_diff_text(None, Some(cmp))?;
        if !diff.is_empty() {
            info!("Diff:\n{}", diff);
        }
    }

    for (name, desired_cmp) in &plan.update {
        info!("Update: {}", name);
        let current_cmp = current.get(name);
        let diff = component_diff_text(current_cmp, Some(desired_cmp))?;
        if !diff.is_empty() {
            info!("Diff:\n{}", diff);
        }
        if let Some(current_cmp) = current_cmp {
            if current_cmp.secret_values != desired_cmp.secret_values {
                info!("Diff: secrets have changed, not shown here");
            }
        }
    }

    Ok(())
}
