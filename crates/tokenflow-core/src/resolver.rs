use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokenflow_common::Token;
use tracing::{debug, warn};

/// Summary of an alias resolution pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub resolved: usize,
    /// Ids of aliases whose chain ends at a token outside the set
    pub dangling: Vec<String>,
    /// Ids of aliases whose chain revisits a token
    pub cycles: Vec<String>,
}

enum Outcome {
    Resolved(Value),
    Dangling,
    Cycle,
}

/// Fill `resolved_value` for every alias whose chain reaches a concrete token.
///
/// Dangling and cyclic aliases keep `resolved_value` unset and are reported, never fatal.
pub fn resolve_aliases(tokens: &mut [Token]) -> ResolutionReport {
    let index: HashMap<String, usize> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    let mut report = ResolutionReport::default();

    for i in 0..tokens.len() {
        if tokens[i].alias_to.is_none() {
            continue;
        }

        match follow_chain(tokens, &index, i) {
            Outcome::Resolved(value) => {
                tokens[i].resolved_value = Some(value);
                report.resolved += 1;
            }
            Outcome::Dangling => {
                tokens[i].resolved_value = None;
                report.dangling.push(tokens[i].id.clone());
            }
            Outcome::Cycle => {
                tokens[i].resolved_value = None;
                warn!("Alias cycle detected at {}", tokens[i].qualified_name);
                report.cycles.push(tokens[i].id.clone());
            }
        }
    }

    debug!(
        "Resolved {} aliases ({} dangling, {} cyclic)",
        report.resolved,
        report.dangling.len(),
        report.cycles.len()
    );
    report
}

fn follow_chain(tokens: &[Token], index: &HashMap<String, usize>, start: usize) -> Outcome {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(tokens[start].id.as_str());
    let mut target = tokens[start].alias_to.as_deref();

    while let Some(id) = target {
        if !visited.insert(id) {
            return Outcome::Cycle;
        }
        let Some(&next) = index.get(id) else {
            return Outcome::Dangling;
        };
        match tokens[next].alias_to.as_deref() {
            Some(further) => target = Some(further),
            None => {
                let concrete = &tokens[next];
                return Outcome::Resolved(
                    concrete
                        .resolved_value
                        .clone()
                        .unwrap_or_else(|| concrete.value.clone()),
                );
            }
        }
    }

    Outcome::Dangling
}
