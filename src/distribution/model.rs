//! Typed distribution tree.

use crate::error::ConfigError;

/// Variable holding the number of occupants of a room.
pub const OCCUPANCY_VARIABLE: &str = "ocupacion_habitacion";

/// Ordered outcome -> probability mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Categorical {
    outcomes: Vec<(String, f64)>,
}

impl Categorical {
    /// Create from ordered pairs. Later duplicates overwrite earlier ones.
    pub fn new<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut outcomes: Vec<(String, f64)> = Vec::new();
        for (k, p) in pairs {
            let k = k.into();
            match outcomes.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = p,
                None => outcomes.push((k, p)),
            }
        }
        Self { outcomes }
    }

    /// A single outcome with probability 1.
    pub fn certain(outcome: impl Into<String>) -> Self {
        let outcome: String = outcome.into();
        Self::new([(outcome, 1.0)])
    }

    pub fn outcomes(&self) -> &[(String, f64)] {
        &self.outcomes
    }

    pub fn probability(&self, outcome: &str) -> Option<f64> {
        self.outcomes
            .iter()
            .find(|(k, _)| k == outcome)
            .map(|(_, p)| *p)
    }

    pub fn total(&self) -> f64 {
        self.outcomes.iter().map(|(_, p)| p).sum()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Same outcomes with every probability multiplied by `factor`.
    pub(crate) fn scaled(&self, factor: f64) -> Self {
        Self {
            outcomes: self
                .outcomes
                .iter()
                .map(|(k, p)| (k.clone(), p * factor))
                .collect(),
        }
    }
}

/// One categorical per value of a condition variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedDistribution {
    /// Variable whose value selects the branch.
    pub condition: String,
    branches: Vec<(String, Categorical)>,
}

impl ConditionedDistribution {
    pub fn new<I, K>(condition: impl Into<String>, branches: I) -> Self
    where
        I: IntoIterator<Item = (K, Categorical)>,
        K: Into<String>,
    {
        Self {
            condition: condition.into(),
            branches: branches.into_iter().map(|(k, c)| (k.into(), c)).collect(),
        }
    }

    pub fn branch(&self, condition_value: &str) -> Option<&Categorical> {
        self.branches
            .iter()
            .find(|(k, _)| k == condition_value)
            .map(|(_, c)| c)
    }

    pub fn branches(&self) -> &[(String, Categorical)] {
        &self.branches
    }
}

/// Probability spec of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilitySpec {
    Flat(Categorical),
    Conditioned(ConditionedDistribution),
}

impl ProbabilitySpec {
    /// Name of the condition variable, if any.
    pub fn condition(&self) -> Option<&str> {
        match self {
            ProbabilitySpec::Flat(_) => None,
            ProbabilitySpec::Conditioned(c) => Some(&c.condition),
        }
    }
}

/// Whether a variable is drawn once per room or once per guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Individual,
    SharedByRoom,
}

/// A named variable of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionEntry {
    pub name: String,
    pub spec: ProbabilitySpec,
    pub scope: Scope,
}

impl DistributionEntry {
    pub fn flat(name: impl Into<String>, dist: Categorical) -> Self {
        Self {
            name: name.into(),
            spec: ProbabilitySpec::Flat(dist),
            scope: Scope::Individual,
        }
    }

    pub fn conditioned(name: impl Into<String>, dist: ConditionedDistribution) -> Self {
        Self {
            name: name.into(),
            spec: ProbabilitySpec::Conditioned(dist),
            scope: Scope::Individual,
        }
    }

    /// Mark the variable as drawn once per room.
    pub fn shared(mut self) -> Self {
        self.scope = Scope::SharedByRoom;
        self
    }
}

/// Validated tree of categorical distributions plus the room occupancy.
///
/// Immutable once built; normalisation produces a new model.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionModel {
    entries: Vec<DistributionEntry>,
    occupancy: Categorical,
    occupancy_declared: bool,
    shared_order: Vec<usize>,
    individual_order: Vec<usize>,
}

impl DistributionModel {
    /// Build a model. A missing occupancy defaults to one occupant per room.
    pub fn new(
        entries: Vec<DistributionEntry>,
        occupancy: Option<Categorical>,
    ) -> Result<Self, ConfigError> {
        let occupancy_declared = occupancy.is_some();
        let occupancy = occupancy.unwrap_or_else(|| Categorical::certain("1"));

        for (outcome, _) in occupancy.outcomes() {
            match outcome.trim().parse::<u32>() {
                Ok(n) if n > 0 => {}
                _ => return Err(ConfigError::InvalidOccupancy(outcome.clone())),
            }
        }

        for (i, entry) in entries.iter().enumerate() {
            if entry.name == OCCUPANCY_VARIABLE {
                return Err(ConfigError::InvalidDocument {
                    document: "distribution".to_string(),
                    reason: format!("'{}' must be passed as the occupancy", OCCUPANCY_VARIABLE),
                });
            }
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(ConfigError::InvalidDocument {
                    document: "distribution".to_string(),
                    reason: format!("variable '{}' declared twice", entry.name),
                });
            }
        }

        check_cycles(&entries)?;
        let shared_order = sampling_order(&entries, Scope::SharedByRoom);
        let individual_order = sampling_order(&entries, Scope::Individual);

        Ok(Self {
            entries,
            occupancy,
            occupancy_declared,
            shared_order,
            individual_order,
        })
    }

    /// All variables except occupancy, in document order.
    pub fn entries(&self) -> &[DistributionEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&DistributionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Room occupancy distribution (outcomes are positive integers).
    pub fn occupancy(&self) -> &Categorical {
        &self.occupancy
    }

    /// Whether the occupancy came from the document rather than the default.
    pub fn occupancy_declared(&self) -> bool {
        self.occupancy_declared
    }

    /// Room-level variables in sampling order.
    pub fn shared(&self) -> impl Iterator<Item = &DistributionEntry> {
        self.shared_order.iter().map(|&i| &self.entries[i])
    }

    /// Guest-level variables in sampling order.
    pub fn individual(&self) -> impl Iterator<Item = &DistributionEntry> {
        self.individual_order.iter().map(|&i| &self.entries[i])
    }

    /// Rebuild with new specs, keeping names, scopes and order.
    pub(crate) fn map_specs<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&str, &ProbabilitySpec) -> ProbabilitySpec,
    {
        let entries = self
            .entries
            .iter()
            .map(|e| DistributionEntry {
                name: e.name.clone(),
                spec: f(&e.name, &e.spec),
                scope: e.scope,
            })
            .collect();
        let occupancy = match f(OCCUPANCY_VARIABLE, &ProbabilitySpec::Flat(self.occupancy.clone())) {
            ProbabilitySpec::Flat(c) => c,
            ProbabilitySpec::Conditioned(_) => self.occupancy.clone(),
        };

        Self {
            entries,
            occupancy,
            occupancy_declared: self.occupancy_declared,
            shared_order: self.shared_order.clone(),
            individual_order: self.individual_order.clone(),
        }
    }
}

/// Reject any condition chain that loops.
fn check_cycles(entries: &[DistributionEntry]) -> Result<(), ConfigError> {
    for start in entries {
        let mut seen = vec![start.name.as_str()];
        let mut current = start;
        while let Some(condition) = current.spec.condition() {
            if seen.contains(&condition) {
                return Err(ConfigError::ConditionCycle(start.name.clone()));
            }
            match entries.iter().find(|e| e.name == condition) {
                Some(next) => {
                    seen.push(&next.name);
                    current = next;
                }
                None => break,
            }
        }
    }
    Ok(())
}

/// Stable dependency order of the entries in `scope`: a variable comes after
/// any same-scope variable it is conditioned on.
fn sampling_order(entries: &[DistributionEntry], scope: Scope) -> Vec<usize> {
    let mut pending: Vec<usize> = (0..entries.len())
        .filter(|&i| entries[i].scope == scope)
        .collect();
    let mut order = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|&i| {
            entries[i].spec.condition().is_none_or(|cond| {
                !pending
                    .iter()
                    .any(|&j| j != i && entries[j].name == cond)
            })
        });
        // Cycles are rejected before this runs, so some entry is always ready.
        let pos = ready.unwrap_or(0);
        order.push(pending.remove(pos));
    }

    order
}
