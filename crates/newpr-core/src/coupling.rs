//! C2 — Coupling Enforcer.
//!
//! A fixed table of [`CouplingRule`]s (literal path set or predicate)
//! enumerates files that must live in the same group (§4.2). For each rule,
//! find every changed path it matches; if those paths currently span more
//! than one group, move all of them to the *earliest* group by input
//! ordering and record a [`ForcedMove`]. Input ownership is never mutated
//! in place — this always returns a revised copy (P3).

use crate::model::{GroupId, Ownership};

/// One coupling rule: either a literal set of candidate filenames, or a
/// predicate over the post-rename path.
pub enum CouplingRule {
    /// Matches paths whose basename is in this literal set.
    Literal {
        /// Human-readable name, used in forced-move diagnostics.
        name: String,
        /// Candidate basenames.
        names: Vec<String>,
    },
    /// Matches any path for which the predicate returns `true`.
    Predicate {
        /// Human-readable name, used in forced-move diagnostics.
        name: String,
        matcher: Box<dyn Fn(&str) -> bool + Send + Sync>,
    },
}

impl CouplingRule {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Literal { names, .. } => {
                let basename = path.rsplit('/').next().unwrap_or(path);
                names.iter().any(|n| n == basename)
            }
            Self::Predicate { matcher, .. } => matcher(path),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Self::Literal { name, .. } | Self::Predicate { name, .. } => name,
        }
    }
}

/// Build the fixed coupling-rule table from config (§4.2's three rules:
/// dependency manifest + lockfile family, a singleton attributes file, and
/// the top-level config-family predicate).
#[must_use]
pub fn default_rules(config: &crate::config::CouplingConfig) -> Vec<CouplingRule> {
    let mut manifest_family = vec![config.manifest_file.clone()];
    manifest_family.extend(config.lockfiles.iter().cloned());

    let prefix = config.config_family_prefix.clone();

    vec![
        CouplingRule::Literal {
            name: "dependency manifest + lockfiles".to_owned(),
            names: manifest_family,
        },
        CouplingRule::Literal {
            name: "global attributes file".to_owned(),
            names: vec![config.attributes_file.clone()],
        },
        CouplingRule::Predicate {
            name: "top-level config family".to_owned(),
            matcher: Box::new(move |path: &str| {
                let basename = path.rsplit('/').next().unwrap_or(path);
                basename == format!("{prefix}.json")
                    || basename
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('.'))
                        .is_some_and(|rest| rest.ends_with(".json"))
            }),
        },
    ]
}

/// One path moved by coupling enforcement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForcedMove {
    /// The path that was moved.
    pub path: String,
    /// Its group before enforcement.
    pub from: GroupId,
    /// Its group after enforcement (the earliest group touching the set).
    pub to: GroupId,
}

/// An advisory warning raised while enforcing coupling (e.g. a rule
/// matched paths with no current owner at all).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CouplingWarning(pub String);

/// The result of running coupling enforcement once.
pub struct CouplingResult {
    /// Revised ownership (never the same allocation as the input).
    pub ownership: Ownership,
    /// Every forced move applied, in rule-then-path order.
    pub forced_moves: Vec<ForcedMove>,
    /// Advisory warnings.
    pub warnings: Vec<CouplingWarning>,
}

/// Enforce coupling rules over `ownership`.
///
/// `group_order` is the input ordering used to break ties on "earliest
/// group" — typically the order groups were declared by the classifier or
/// caller, before any topological reordering happens in C3.
///
/// Idempotent: running this twice on its own output produces zero further
/// moves, since every coupling set will already share one group.
#[must_use]
pub fn enforce(
    ownership: &Ownership,
    changed_paths: &[String],
    group_order: &[GroupId],
    rules: &[CouplingRule],
) -> CouplingResult {
    let mut revised = ownership.clone();
    let mut forced_moves = Vec::new();
    let mut warnings = Vec::new();

    let rank = |g: &GroupId| group_order.iter().position(|o| o == g);

    for rule in rules {
        let matched: Vec<&String> = changed_paths.iter().filter(|p| rule.matches(p)).collect();
        if matched.len() < 2 {
            continue;
        }

        let mut owners: Vec<(&String, GroupId)> = Vec::new();
        for path in &matched {
            match revised.get(path.as_str()) {
                Some(group) => owners.push((path, group.clone())),
                None => {
                    let rule_name = rule.describe();
                    warnings.push(CouplingWarning(format!(
                        "coupling rule '{rule_name}' matched unowned path '{path}'"
                    )));
                }
            }
        }

        let mut distinct_groups: Vec<&GroupId> = owners.iter().map(|(_, g)| g).collect();
        distinct_groups.sort_by_key(|g| g.as_str().to_owned());
        distinct_groups.dedup();
        if distinct_groups.len() <= 1 {
            continue;
        }

        let earliest = distinct_groups
            .iter()
            .min_by_key(|g| rank(g).unwrap_or(usize::MAX))
            .expect("non-empty by the len() > 1 check above")
            .clone()
            .clone();

        for (path, current_group) in owners {
            if current_group != earliest {
                revised.assign(path.clone(), earliest.clone());
                forced_moves.push(ForcedMove {
                    path: path.clone(),
                    from: current_group,
                    to: earliest.clone(),
                });
            }
        }
    }

    CouplingResult {
        ownership: revised,
        forced_moves,
        warnings,
    }
}
