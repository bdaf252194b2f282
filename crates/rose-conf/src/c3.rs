//! C3 linearisation
//!
//! Computes the order in which an item and its (transitive) bases are consulted. The item comes first, every
//! item comes before its own bases, the declared order of bases is kept and the order is monotonic with
//! respect to the linearisation of each base.
//!
//! ```
//! use rose_conf::c3::{mro, MroError};
//!
//! let bases = |name: &str| -> Result<Vec<String>, MroError> {
//!     Ok(match name {
//!         "child" => vec!["left".into(), "right".into()],
//!         "left" | "right" => vec!["root".into()],
//!         _ => vec![],
//!     })
//! };
//! assert_eq!(mro("child", bases).unwrap(), vec!["child", "left", "right", "root"]);
//! ```
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MroError {
    /// An item depends on itself
    #[error("{target}: cannot resolve MRO")]
    Cycle { target: String },
    /// The declared orders of bases contradict each other
    #[error("{target}: cannot resolve MRO")]
    Inconsistent { target: String },
}

impl MroError {
    pub fn target(&self) -> &str {
        match self {
            MroError::Cycle { target } | MroError::Inconsistent { target } => target,
        }
    }
}

/// Resolve the linearisation of `target`
///
/// `get_base_names` is called at most once per name. Its errors are passed through, which lets callers load
/// data lazily while resolving.
pub fn mro<E, F>(target: &str, mut get_base_names: F) -> Result<Vec<String>, E>
where
    E: From<MroError>,
    F: FnMut(&str) -> Result<Vec<String>, E>,
{
    let mut results: HashMap<String, Vec<String>> = HashMap::new();
    let mut base_names_of: HashMap<String, Vec<String>> = HashMap::new();
    let mut dependents_of: HashMap<String, Vec<String>> = HashMap::new();
    let mut stack = vec![target.to_string()];

    while !results.contains_key(target) {
        let Some(name) = stack.pop() else {
            break;
        };
        if results.contains_key(&name) {
            continue;
        }

        if !base_names_of.contains_key(&name) {
            let base_names = get_base_names(&name)?;
            base_names_of.insert(name.clone(), base_names);
        }
        let base_names = &base_names_of[&name];

        if base_names.is_empty() {
            results.insert(name.clone(), vec![name]);
            continue;
        }

        if base_names.iter().all(|base| results.contains_key(base)) {
            let resolved = merge(&name, base_names, &results).ok_or_else(|| {
                MroError::Inconsistent {
                    target: target.to_string(),
                }
            })?;
            results.insert(name, resolved);
            continue;
        }

        // resolve the remaining bases first
        let mut dependents = dependents_of.get(&name).cloned().unwrap_or_default();
        dependents.push(name.clone());
        stack.push(name.clone());
        for base in base_names {
            if results.contains_key(base) {
                continue;
            }
            if dependents.contains(base) {
                return Err(MroError::Cycle {
                    target: target.to_string(),
                }
                .into());
            }
            dependents_of.insert(base.clone(), dependents.clone());
            stack.push(base.clone());
        }
    }

    let order = results.remove(target).unwrap_or_default();
    tracing::debug!(target, ?order, "resolved linearisation");
    Ok(order)
}

/// Merge the linearisations of `base_names`
///
/// Returns `None` when no consistent order exists.
fn merge(
    name: &str,
    base_names: &[String],
    results: &HashMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    let mut resolved = vec![name.to_string()];

    // selection sequences, collected breadth first over the linearisations of the bases
    let mut seqs: Vec<&[String]> = vec![];
    let mut queue: std::collections::VecDeque<&String> = base_names.iter().collect();
    while let Some(base) = queue.pop_front() {
        let linearisation = &results[base];
        for i in 0..linearisation.len() {
            let seq = &linearisation[i..];
            if !seqs.contains(&seq) {
                seqs.push(seq);
            }
        }
        for ancestor in &linearisation[1..] {
            if !queue.contains(&ancestor) {
                queue.push_back(ancestor);
            }
        }
    }

    while !seqs.is_empty() {
        // a candidate must not appear in the tail of any sequence
        let candidate = seqs
            .iter()
            .map(|seq| &seq[0])
            .find(|head| !seqs.iter().any(|seq| seq[1..].contains(*head)))?
            .clone();
        seqs.retain(|seq| seq[0] != candidate);
        resolved.push(candidate);
    }

    Some(resolved)
}
