//! Interval branch-and-bound over integer boxes.
//!
//! Given an expression `e` and a target `e >= k` (or `e <= k`), find a point
//! of the box where the target holds, or prove there is none.
//!
//! Each step evaluates `e` over the current box with interval arithmetic and
//! drops the box if the target is out of reach. Otherwise it evaluates a
//! witness vertex exactly: variables occurring only positively are pushed
//! towards the goal end of their range, negative ones the other way. When
//! every variable of `e` has a single polarity the witness is the exact
//! optimum over the box, so the box is settled. Variables with mixed
//! polarity are bisected, widest first.

use crate::compiler::{Expr, VarId};
use crate::types::UnknownReason;
use std::time::Instant;

/// Inclusive integer range of one variable.
pub(crate) type Range = (i128, i128);

/// Which side of the threshold the search is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Goal {
    /// `expr >= k`
    AtLeast(i128),
    /// `expr <= k`
    AtMost(i128),
}

impl Goal {
    fn reached(self, value: i128) -> bool {
        match self {
            Self::AtLeast(k) => value >= k,
            Self::AtMost(k) => value <= k,
        }
    }

    fn reachable(self, (lo, hi): Range) -> bool {
        match self {
            Self::AtLeast(k) => hi >= k,
            Self::AtMost(k) => lo <= k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
    Mixed,
}

/// Limits shared by every search of one solve.
pub(crate) struct Budget<'a> {
    pub deadline: Instant,
    pub max_steps: u64,
    pub steps: u64,
    pub cancel: Option<&'a dyn Fn() -> bool>,
}

impl Budget<'_> {
    /// Account for one step, or say why the search must stop.
    fn step(&mut self) -> Result<(), UnknownReason> {
        if self.cancel.is_some_and(|cancelled| cancelled()) {
            return Err(UnknownReason::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(UnknownReason::Timeout);
        }
        if self.steps >= self.max_steps {
            return Err(UnknownReason::StepBudgetExhausted);
        }
        self.steps += 1;
        Ok(())
    }
}

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Search {
    /// A point reaching the goal
    Found(Vec<i128>),
    /// The goal is unreachable inside the box
    Exhausted,
    /// The budget ran out first
    Stopped(UnknownReason),
}

/// Search `domain` for a point where `expr` reaches `goal`.
pub(crate) fn search(expr: &Expr, goal: Goal, domain: &[Range], budget: &mut Budget<'_>) -> Search {
    let polarity = polarities(expr, domain.len());
    let mut stack = vec![domain.to_vec()];

    while let Some(current) = stack.pop() {
        if let Err(reason) = budget.step() {
            return Search::Stopped(reason);
        }

        if !goal.reachable(interval(expr, &current)) {
            continue;
        }

        let point = witness(goal, &polarity, &current);
        if goal.reached(expr.eval(&point)) {
            return Search::Found(point);
        }

        // Widest mixed-polarity variable, lowest id on ties.
        let split = polarity
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Some(Polarity::Mixed))
            .map(|(i, _)| (i, current[i].1 - current[i].0))
            .filter(|(_, width)| *width > 0)
            .fold(None, |best: Option<(usize, i128)>, (i, width)| match best {
                Some((_, w)) if w >= width => best,
                _ => Some((i, width)),
            });

        let Some((var, _)) = split else {
            continue;
        };
        let (lo, hi) = current[var];
        let mid = lo + (hi - lo) / 2;
        let mut upper = current.clone();
        upper[var] = (mid + 1, hi);
        let mut lower = current;
        lower[var] = (lo, mid);
        stack.push(upper);
        stack.push(lower);
    }

    Search::Exhausted
}

/// Interval enclosure of `expr` over `domain`.
pub(crate) fn interval(expr: &Expr, domain: &[Range]) -> Range {
    match expr {
        Expr::Const(c) => (i128::from(*c), i128::from(*c)),
        Expr::Var(VarId(i)) => domain.get(*i).copied().unwrap_or((0, 0)),
        Expr::Sum(terms) => terms
            .iter()
            .map(|t| interval(t, domain))
            .fold((0, 0), |(alo, ahi), (lo, hi)| (alo + lo, ahi + hi)),
        Expr::Max(terms) => fold_nonempty(terms, domain, i128::max),
        Expr::Min(terms) => fold_nonempty(terms, domain, i128::min),
        Expr::Scale(k, inner) => {
            let k = i128::from(*k);
            let (lo, hi) = interval(inner, domain);
            if k >= 0 {
                (k * lo, k * hi)
            } else {
                (k * hi, k * lo)
            }
        }
    }
}

fn fold_nonempty(terms: &[Expr], domain: &[Range], pick: fn(i128, i128) -> i128) -> Range {
    let mut ranges = terms.iter().map(|t| interval(t, domain));
    let first = ranges.next().unwrap_or((0, 0));
    ranges.fold(first, |(alo, ahi), (lo, hi)| (pick(alo, lo), pick(ahi, hi)))
}

/// Polarity of each variable in `expr` (`None` when it does not occur).
fn polarities(expr: &Expr, count: usize) -> Vec<Option<Polarity>> {
    fn walk(expr: &Expr, positive: bool, out: &mut [Option<Polarity>]) {
        match expr {
            Expr::Const(_) => {}
            Expr::Var(VarId(i)) => {
                let seen = if positive { Polarity::Positive } else { Polarity::Negative };
                if let Some(slot) = out.get_mut(*i) {
                    *slot = match *slot {
                        None => Some(seen),
                        Some(p) if p == seen => Some(p),
                        Some(_) => Some(Polarity::Mixed),
                    };
                }
            }
            Expr::Sum(terms) | Expr::Max(terms) | Expr::Min(terms) => {
                for t in terms {
                    walk(t, positive, out);
                }
            }
            Expr::Scale(0, _) => {}
            Expr::Scale(k, inner) => walk(inner, positive == (*k > 0), out),
        }
    }

    let mut out = vec![None; count];
    walk(expr, true, &mut out);
    out
}

/// The vertex of `domain` most likely to reach `goal`.
///
/// Variables that do not occur stay at their lower bound.
fn witness(goal: Goal, polarity: &[Option<Polarity>], domain: &[Range]) -> Vec<i128> {
    let maximize = matches!(goal, Goal::AtLeast(_));
    domain
        .iter()
        .zip(polarity)
        .map(|(&(lo, hi), p)| match p {
            Some(Polarity::Positive) if maximize => hi,
            Some(Polarity::Negative) if !maximize => hi,
            _ => lo,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn budget<'a>(max_steps: u64) -> Budget<'a> {
        Budget {
            deadline: Instant::now() + Duration::from_secs(60),
            max_steps,
            steps: 0,
            cancel: None,
        }
    }

    fn v(i: usize) -> Expr {
        Expr::Var(VarId(i))
    }

    fn minus(e: Expr) -> Expr {
        Expr::Scale(-1, Box::new(e))
    }

    #[test]
    fn test_monotone_sum_found_in_one_step() {
        let expr = Expr::Sum(vec![v(0), v(1)]);
        let mut b = budget(100);
        let found = search(&expr, Goal::AtLeast(16), &[(0, 10), (0, 10)], &mut b);
        assert_eq!(found, Search::Found(vec![10, 10]));
        assert_eq!(b.steps, 1);
    }

    #[test]
    fn test_monotone_sum_exhausted() {
        let expr = Expr::Sum(vec![v(0), v(1)]);
        let mut b = budget(100);
        assert_eq!(search(&expr, Goal::AtLeast(26), &[(0, 10), (0, 10)], &mut b), Search::Exhausted);
    }

    #[test]
    fn test_negative_polarity_minimizes() {
        // 5 - x <= 0 needs x >= 5
        let expr = Expr::Sum(vec![Expr::Const(5), minus(v(0))]);
        let mut b = budget(100);
        assert_eq!(search(&expr, Goal::AtMost(0), &[(0, 7)], &mut b), Search::Found(vec![7]));
    }

    #[test]
    fn test_mixed_polarity_is_bisected() {
        // x - x >= 1 is impossible; needs a full split of x
        let expr = Expr::Sum(vec![v(0), minus(v(0))]);
        let mut b = budget(1000);
        assert_eq!(search(&expr, Goal::AtLeast(1), &[(0, 7)], &mut b), Search::Exhausted);
        assert!(b.steps > 1);
    }

    #[test]
    fn test_mixed_polarity_finds_interior_point() {
        // max(x, 6) - x >= 2 holds for x <= 4
        let expr = Expr::Sum(vec![Expr::Max(vec![v(0), Expr::Const(6)]), minus(v(0))]);
        let mut b = budget(1000);
        match search(&expr, Goal::AtLeast(2), &[(3, 9)], &mut b) {
            Search::Found(point) => assert!(point[0] <= 4),
            other => panic!("expected a point, got {other:?}"),
        }
    }

    #[test]
    fn test_step_budget() {
        let expr = Expr::Sum(vec![v(0), minus(v(0))]);
        let mut b = budget(10);
        assert_eq!(
            search(&expr, Goal::AtLeast(1), &[(0, 1_000_000)], &mut b),
            Search::Stopped(UnknownReason::StepBudgetExhausted)
        );
    }

    #[test]
    fn test_cancellation() {
        let cancelled = || true;
        let mut b = budget(10);
        b.cancel = Some(&cancelled);
        assert_eq!(
            search(&v(0), Goal::AtLeast(0), &[(0, 1)], &mut b),
            Search::Stopped(UnknownReason::Cancelled)
        );
    }

    #[test]
    fn test_interval_of_scaled_max() {
        let expr = Expr::Scale(-2, Box::new(Expr::Max(vec![v(0), v(1)])));
        assert_eq!(interval(&expr, &[(1, 3), (2, 5)]), (-10, -4));
    }
}
