//! Priority resolution: which single action, if any, a tick produces.
//!
//! A `RuleBook` is an ordered list of `(predicate, precondition)` entries.
//! Evaluation walks it top to bottom and stops at the first entry whose
//! predicate fired and whose precondition holds for the current position.

use tracing::debug;

use common::{Action, PositionState, RuleId, Side, Signal, SignalKind};

use crate::rules::{Predicate, RuleInputs};

/// Position requirement for an entry to be acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Flat,
    /// Holding `side`, opened by one of `opened_by`.
    Holding {
        side: Side,
        opened_by: &'static [RuleId],
    },
}

impl Precondition {
    pub fn holds(&self, position: &PositionState) -> bool {
        match self {
            Precondition::Flat => position.is_flat(),
            Precondition::Holding { side, opened_by } => {
                // A position adopted through reconciliation has no known
                // opening rule; it is treated as a Rule 1 position.
                let rule = position.opening_rule.unwrap_or(RuleId::Rule1);
                position.side == Some(*side) && opened_by.contains(&rule)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEntry {
    pub predicate: Predicate,
    pub precondition: Precondition,
}

impl RuleEntry {
    const fn flat(predicate: Predicate) -> Self {
        Self {
            predicate,
            precondition: Precondition::Flat,
        }
    }

    const fn holding(predicate: Predicate, side: Side, opened_by: &'static [RuleId]) -> Self {
        Self {
            predicate,
            precondition: Precondition::Holding { side, opened_by },
        }
    }

    /// Action produced when this entry wins.
    pub fn action(&self, signal: &Signal) -> Action {
        let side = signal.kind.side();
        let rule = signal.rule;
        match signal.kind {
            SignalKind::BuyEnter | SignalKind::ShortEnter => Action::Enter { side, rule },
            SignalKind::BuyExit | SignalKind::ShortExit => Action::Exit { side, rule },
            SignalKind::BuyStop | SignalKind::ShortStop => Action::Stop {
                side,
                rule,
                price_level: signal.price,
            },
        }
    }
}

/// The winning signal and the action it maps to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub signal: Signal,
    pub action: Action,
}

/// Result of walking a book at one index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Predicates that fired before evaluation stopped, in book order.
    pub fired: Vec<Signal>,
    pub decision: Option<Decision>,
}

const RULE_2: &[RuleId] = &[RuleId::Rule2];
const ANY_RULE: &[RuleId] = &[RuleId::Rule1, RuleId::Rule2, RuleId::Rule3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBook {
    name: &'static str,
    entries: Vec<RuleEntry>,
}

impl RuleBook {
    pub fn new(name: &'static str, entries: Vec<RuleEntry>) -> Self {
        Self { name, entries }
    }

    /// Evaluated once per closed interval. Stops beat everything else.
    /// Rule 2 stops only manage Rule 2 positions; Rule 1 exits close any
    /// position on their side.
    pub fn closing() -> Self {
        Self::new(
            "closing",
            vec![
                RuleEntry::holding(Predicate::Rule2ShortStop, Side::Short, RULE_2),
                RuleEntry::holding(Predicate::Rule2BuyStop, Side::Long, RULE_2),
                RuleEntry::flat(Predicate::Rule1BuyEnter),
                RuleEntry::holding(Predicate::Rule1BuyExit, Side::Long, ANY_RULE),
                RuleEntry::flat(Predicate::Rule1ShortEnter),
                RuleEntry::holding(Predicate::Rule1ShortExit, Side::Short, ANY_RULE),
                RuleEntry::flat(Predicate::Rule3BuyEnter),
                RuleEntry::flat(Predicate::Rule3ShortEnter),
            ],
        )
    }

    /// Evaluated on every partial tick. Only the Rule 2 retest entries react
    /// to a forming interval.
    pub fn partial() -> Self {
        Self::new(
            "partial",
            vec![
                RuleEntry::flat(Predicate::Rule2BuyEnter),
                RuleEntry::flat(Predicate::Rule2ShortEnter),
            ],
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn evaluate(
        &self,
        inputs: &RuleInputs<'_>,
        i: usize,
        position: &PositionState,
    ) -> Evaluation {
        let mut eval = Evaluation::default();
        for entry in &self.entries {
            if !entry.predicate.evaluate(inputs, i) {
                continue;
            }
            let Some(signal) = inputs.signal(entry.predicate, i) else {
                continue;
            };
            eval.fired.push(signal);

            if entry.precondition.holds(position) {
                eval.decision = Some(Decision {
                    signal,
                    action: entry.action(&signal),
                });
                break;
            }
            debug!(
                book = self.name,
                predicate = %entry.predicate,
                position = %position,
                "Signal fired but position precondition not met"
            );
        }
        eval
    }
}
