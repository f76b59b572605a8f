//! Rule predicates.
//!
//! Every rule follows the same two-phase shape: a *qualify* condition on the
//! prior bar(s) (`i - 1`, `i - 2`) and a *trigger* condition on bar `i`.
//! Predicates only read index `i` and earlier. Out-of-range indices and
//! undefined (NaN) averages make every comparison false, so a series shorter
//! than the largest window simply produces no signals.

use chrono::{DateTime, Utc};

use common::{RuleId, Signal, SignalKind};

use crate::config::{Rule2Config, Rule2Stop, Rule2Variant};
use crate::indicators::{IndicatorSet, MaKey, RegimeParams};

/// Bars between the two points of the slope comparison.
const SLOPE_SPAN: usize = 3;

/// Everything a predicate may read.
#[derive(Debug, Clone, Copy)]
pub struct RuleInputs<'a> {
    pub timestamps: &'a [DateTime<Utc>],
    pub closes: &'a [f64],
    pub highs: &'a [f64],
    pub lows: &'a [f64],
    pub ma: IndicatorSet<'a>,
    pub regime: RegimeParams,
    pub rule2: Rule2Config,
}

impl<'a> RuleInputs<'a> {
    fn price(&self, i: usize) -> f64 {
        at(self.closes, i)
    }

    fn high(&self, i: usize) -> f64 {
        at(self.highs, i)
    }

    fn low(&self, i: usize) -> f64 {
        at(self.lows, i)
    }

    /// Build the signal `predicate` would emit at `i`.
    pub fn signal(&self, predicate: Predicate, i: usize) -> Option<Signal> {
        Some(Signal {
            kind: predicate.kind(),
            rule: predicate.rule(),
            index: i,
            timestamp: *self.timestamps.get(i)?,
            price: self.price(i),
        })
    }
}

fn at(column: &[f64], i: usize) -> f64 {
    column.get(i).copied().unwrap_or(f64::NAN)
}

/// Average change per bar over the last `SLOPE_SPAN` bars.
fn slope(column: &[f64], i: usize) -> f64 {
    match i.checked_sub(SLOPE_SPAN) {
        Some(start) => (at(column, i) - at(column, start)) / SLOPE_SPAN as f64,
        None => f64::NAN,
    }
}

/// Every rule predicate, named by rule family and signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predicate {
    Rule1BuyEnter,
    Rule1BuyExit,
    Rule1ShortEnter,
    Rule1ShortExit,
    Rule2BuyEnter,
    Rule2BuyStop,
    Rule2ShortEnter,
    Rule2ShortStop,
    Rule3BuyEnter,
    Rule3ShortEnter,
}

impl Predicate {
    pub const ALL: [Predicate; 10] = [
        Predicate::Rule1BuyEnter,
        Predicate::Rule1BuyExit,
        Predicate::Rule1ShortEnter,
        Predicate::Rule1ShortExit,
        Predicate::Rule2BuyEnter,
        Predicate::Rule2BuyStop,
        Predicate::Rule2ShortEnter,
        Predicate::Rule2ShortStop,
        Predicate::Rule3BuyEnter,
        Predicate::Rule3ShortEnter,
    ];

    pub fn kind(&self) -> SignalKind {
        match self {
            Predicate::Rule1BuyEnter | Predicate::Rule2BuyEnter | Predicate::Rule3BuyEnter => {
                SignalKind::BuyEnter
            }
            Predicate::Rule1ShortEnter
            | Predicate::Rule2ShortEnter
            | Predicate::Rule3ShortEnter => SignalKind::ShortEnter,
            Predicate::Rule1BuyExit => SignalKind::BuyExit,
            Predicate::Rule1ShortExit => SignalKind::ShortExit,
            Predicate::Rule2BuyStop => SignalKind::BuyStop,
            Predicate::Rule2ShortStop => SignalKind::ShortStop,
        }
    }

    pub fn rule(&self) -> RuleId {
        match self {
            Predicate::Rule1BuyEnter
            | Predicate::Rule1BuyExit
            | Predicate::Rule1ShortEnter
            | Predicate::Rule1ShortExit => RuleId::Rule1,
            Predicate::Rule2BuyEnter
            | Predicate::Rule2BuyStop
            | Predicate::Rule2ShortEnter
            | Predicate::Rule2ShortStop => RuleId::Rule2,
            Predicate::Rule3BuyEnter | Predicate::Rule3ShortEnter => RuleId::Rule3,
        }
    }

    pub fn evaluate(&self, x: &RuleInputs<'_>, i: usize) -> bool {
        match self {
            Predicate::Rule1BuyEnter => rule_1_buy_enter(x, i),
            Predicate::Rule1BuyExit => rule_1_buy_exit(x, i),
            Predicate::Rule1ShortEnter => rule_1_short_enter(x, i),
            Predicate::Rule1ShortExit => rule_1_short_exit(x, i),
            Predicate::Rule2BuyEnter => rule_2_buy_enter(x, i),
            Predicate::Rule2BuyStop => rule_2_buy_stop(x, i),
            Predicate::Rule2ShortEnter => rule_2_short_enter(x, i),
            Predicate::Rule2ShortStop => rule_2_short_stop(x, i),
            Predicate::Rule3BuyEnter => rule_3_buy_enter(x, i),
            Predicate::Rule3ShortEnter => rule_3_short_enter(x, i),
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.rule(), self.kind())
    }
}

/// Every predicate that is true at `i`, in declaration order.
pub fn fired_at(x: &RuleInputs<'_>, i: usize) -> Vec<Signal> {
    Predicate::ALL
        .iter()
        .filter(|p| p.evaluate(x, i))
        .filter_map(|&p| x.signal(p, i))
        .collect()
}

/// Short MA crosses above mid MA while both sit above filter1.
pub fn rule_1_buy_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify =
        ma.short(p) > ma.filter1(p) && ma.mid(p) > ma.filter1(p) && ma.short(p) <= ma.mid(p);
    qualify
        && ma.short(i) > ma.mid(i)
        && x.regime.within_deviance(x.price(i) / ma.mid(i))
}

/// Short MA falls back below mid MA, or mid MA below long MA.
pub fn rule_1_buy_exit(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify =
        ma.short(p) > ma.long(p) && ma.mid(p) >= ma.long(p) && ma.short(p) >= ma.mid(p);
    qualify && (ma.short(i) < ma.mid(i) || ma.mid(i) < ma.long(i))
}

/// Short MA crosses below mid MA while both sit below filter1.
pub fn rule_1_short_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify =
        ma.short(p) < ma.filter1(p) && ma.mid(p) < ma.filter1(p) && ma.short(p) >= ma.mid(p);
    qualify
        && ma.short(i) < ma.mid(i)
        && x.regime.within_deviance(ma.mid(i) / x.price(i))
}

pub fn rule_1_short_exit(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify =
        ma.short(p) <= ma.long(p) && ma.mid(p) <= ma.long(p) && ma.short(p) <= ma.mid(p);
    qualify && (ma.short(i) > ma.mid(i) || ma.mid(i) > ma.long(i))
}

/// Price broke above the long MA, then dips back to touch it while the mid
/// MA is rising faster than the long MA.
pub fn rule_2_buy_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    if i < SLOPE_SPAN {
        return false;
    }
    let (p, q) = (i - 1, i - 2);
    let ma = &x.ma;

    let qualify = x.low(p) > ma.long(p)
        && x.low(q) > ma.long(q)
        && ma.short(p) >= ma.long(p)
        && ma.mid(p) <= ma.long(p)
        && ma.filter1(p) <= ma.long(p);
    if !qualify {
        return false;
    }

    let trigger = x.low(i) <= ma.long(i) * (1.0 + x.regime.allowance)
        && slope(ma.column(MaKey::Mid), i)
            > slope(ma.column(MaKey::Long), i);
    if !trigger {
        return false;
    }

    match x.rule2.variant {
        Rule2Variant::Basic => true,
        Rule2Variant::Filtered => {
            x.price(q) > ma.filter2(q)
                && x.price(i) > ma.long(i)
                && x.price(i) > ma.filter1(i)
                && ma.filter2(p) > ma.filter1(p)
        }
    }
}

/// Mirror of `rule_2_buy_enter`: a retest of the long MA from below.
pub fn rule_2_short_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    if i < SLOPE_SPAN {
        return false;
    }
    let (p, q) = (i - 1, i - 2);
    let ma = &x.ma;

    let qualify = x.high(p) < ma.long(p)
        && x.high(q) < ma.long(q)
        && ma.short(p) < ma.long(p)
        && ma.mid(p) >= ma.long(p)
        && ma.filter1(p) > ma.long(p);
    if !qualify {
        return false;
    }

    let trigger = x.high(i) >= ma.long(i) / (1.0 + x.regime.allowance)
        && slope(ma.column(MaKey::Mid), i)
            < slope(ma.column(MaKey::Long), i);
    if !trigger {
        return false;
    }

    match x.rule2.variant {
        Rule2Variant::Basic => true,
        Rule2Variant::Filtered => {
            x.price(q) < ma.filter2(q)
                && x.price(i) < ma.long(i)
                && x.price(i) < ma.filter1(i)
                && ma.filter2(q) < ma.filter1(q)
        }
    }
}

/// Closes a Rule 2 long once the short MA loses the long MA or the mid MA.
pub fn rule_2_buy_stop(x: &RuleInputs<'_>, i: usize) -> bool {
    let ma = &x.ma;
    match x.rule2.stop {
        Rule2Stop::Absolute => ma.short(i) < ma.long(i),
        Rule2Stop::Crossover => {
            let Some(p) = i.checked_sub(1) else {
                return false;
            };
            let qualify = ma.mid(p) <= ma.long(p) && ma.short(p) >= ma.long(p);
            qualify && (ma.short(i) < ma.long(i) || ma.short(i) < ma.mid(i))
        }
    }
}

pub fn rule_2_short_stop(x: &RuleInputs<'_>, i: usize) -> bool {
    let ma = &x.ma;
    match x.rule2.stop {
        Rule2Stop::Absolute => ma.short(i) > ma.long(i),
        Rule2Stop::Crossover => {
            let Some(p) = i.checked_sub(1) else {
                return false;
            };
            let qualify = ma.mid(p) >= ma.long(p) && ma.short(p) <= ma.long(p);
            qualify && (ma.short(i) > ma.long(i) || ma.short(i) > ma.mid(i))
        }
    }
}

/// Mid MA crosses above the long MA with the short MA leading.
pub fn rule_3_buy_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify = ma.short(p) > ma.long(p) && ma.mid(p) <= ma.long(p);
    qualify
        && ma.mid(i) > ma.long(i)
        && ma.short(i) > ma.mid(i)
        && x.regime.within_deviance(x.price(i) / ma.mid(i))
}

pub fn rule_3_short_enter(x: &RuleInputs<'_>, i: usize) -> bool {
    let Some(p) = i.checked_sub(1) else {
        return false;
    };
    let ma = &x.ma;
    let qualify = ma.short(p) < ma.long(p) && ma.mid(p) >= ma.long(p);
    qualify
        && ma.mid(i) < ma.long(i)
        && ma.short(i) < ma.mid(i)
        && x.regime.within_deviance(ma.mid(i) / x.price(i))
}
