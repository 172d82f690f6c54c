use chrono::Weekday;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;

use super::availability::validate_range;
use super::{Engine, EngineError};

// ── Pricing Engine ───────────────────────────────────────────────
//
// Each 1-hour slot is priced independently: start at multiplier 1, let
// every matching active rule and any active holiday for the slot's own
// calendar date bid, and take the highest multiplier. Never sum, never
// multiply — overlapping rules must not compound. Money is Decimal
// end to end; each hour is rounded to the minor unit before summing.

/// Price of one hour-slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourPrice {
    pub date: chrono::NaiveDate,
    pub start: TimeOfDay,
    pub multiplier: Decimal,
    pub price: Decimal,
    /// Label of the winning rule/holiday, if any beat the base rate.
    pub applied: Option<String>,
}

/// Normal-rate vs premium-rate aggregation, derived from the breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSummary {
    pub standard_hours: u8,
    pub premium_hours: u8,
    pub standard_subtotal: Decimal,
    pub premium_subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub base_price: Decimal,
    pub hours: u8,
    pub total: Decimal,
    pub breakdown: Vec<HourPrice>,
    /// Distinct labels of every rule that won at least one hour.
    pub applied_rules: Vec<String>,
    pub summary: PriceSummary,
}

fn rule_matches(rule: &PricingRule, slot: &HourSlot) -> bool {
    match &rule.kind {
        RuleKind::PeakHours { start, end, days } => {
            days.contains(slot.weekday()) && in_window(slot.start, *start, *end)
        }
        RuleKind::Weekend => matches!(slot.weekday(), Weekday::Sat | Weekday::Sun),
        RuleKind::Special { date: Some(d), .. } => *d == slot.date,
        RuleKind::Special { date: None, days } => days.contains(slot.weekday()),
    }
}

/// Half-open `[start, end)` time-of-day window. `end` of 00:00 means
/// midnight; a window may wrap past midnight (22:00-02:00).
fn in_window(t: TimeOfDay, start: TimeOfDay, end: TimeOfDay) -> bool {
    let t = t.minutes_from_midnight();
    let s = start.minutes_from_midnight();
    let e = match end.minutes_from_midnight() {
        0 => MINS_PER_DAY as u16,
        e => e,
    };
    if s < e { s <= t && t < e } else { t >= s || t < e }
}

/// Compute the price of a range. Pure: same inputs, same quote.
pub fn quote(
    base_price: Decimal,
    rules: &[PricingRule],
    holidays: &[Holiday],
    range: &SlotRange,
) -> PriceQuote {
    let mut breakdown = Vec::with_capacity(usize::from(range.hours));
    let mut applied_rules: Vec<String> = Vec::new();

    for slot in range.hour_slots() {
        let mut multiplier = Decimal::ONE;
        let mut applied: Option<String> = None;

        for rule in rules.iter().filter(|r| r.active) {
            if rule_matches(rule, &slot) && rule.multiplier > multiplier {
                multiplier = rule.multiplier;
                applied = Some(rule.label());
            }
        }
        // Holidays are global and layered on top, same max-combine.
        for holiday in holidays
            .iter()
            .filter(|h| h.active && h.date == slot.date)
        {
            if holiday.multiplier > multiplier {
                multiplier = holiday.multiplier;
                applied = Some(format!("holiday {} x{}", holiday.name, holiday.multiplier));
            }
        }

        let price = (base_price * multiplier).round_dp(2);
        if let Some(label) = &applied
            && !applied_rules.contains(label)
        {
            applied_rules.push(label.clone());
        }
        breakdown.push(HourPrice {
            date: slot.date,
            start: slot.start,
            multiplier,
            price,
            applied,
        });
    }

    let total: Decimal = breakdown.iter().map(|h| h.price).sum();

    let mut summary = PriceSummary {
        standard_hours: 0,
        premium_hours: 0,
        standard_subtotal: Decimal::ZERO,
        premium_subtotal: Decimal::ZERO,
    };
    for h in &breakdown {
        if h.multiplier == Decimal::ONE {
            summary.standard_hours += 1;
            summary.standard_subtotal += h.price;
        } else {
            summary.premium_hours += 1;
            summary.premium_subtotal += h.price;
        }
    }

    PriceQuote {
        base_price,
        hours: range.hours,
        total,
        breakdown,
        applied_rules,
        summary,
    }
}

impl Engine {
    /// Quote a range against the court's current rules and the global
    /// holiday table. Commit recomputes through this path — client-side
    /// totals are never trusted.
    pub async fn price_range(
        &self,
        court_id: Ulid,
        range: &SlotRange,
    ) -> Result<PriceQuote, EngineError> {
        let court = self
            .get_court(&court_id)
            .ok_or(EngineError::NotFound(court_id))?;
        let guard = court.read().await;
        validate_range(&guard, range)?;
        let holidays = self.holidays_for(range);
        Ok(quote(guard.base_price, &guard.rules, &holidays, range))
    }

    /// Active holidays for the calendar dates a range touches (one or
    /// two — overnight ranges straddle midnight).
    pub(super) fn holidays_for(&self, range: &SlotRange) -> Vec<Holiday> {
        let mut dates = vec![range.date];
        if range.wraps_midnight()
            && let Some(next) = range.date.succ_opt()
        {
            dates.push(next);
        }
        dates
            .into_iter()
            .filter_map(|d| self.holidays.get(&d).map(|h| h.value().clone()))
            .filter(|h| h.active)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tod(h: u8) -> TimeOfDay {
        TimeOfDay::from_hour(h).unwrap()
    }

    fn dec(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    // x10 fixed-point helper: mult(15) == 1.5
    fn mult(tenths: i64) -> Decimal {
        Decimal::new(tenths, 1)
    }

    fn peak(start: u8, end: u8, days: DaySet, tenths: i64) -> PricingRule {
        PricingRule {
            id: Ulid::new(),
            court_id: Ulid::new(),
            kind: RuleKind::PeakHours {
                start: tod(start),
                end: tod(end),
                days,
            },
            multiplier: mult(tenths),
            active: true,
        }
    }

    fn weekend(tenths: i64) -> PricingRule {
        PricingRule {
            id: Ulid::new(),
            court_id: Ulid::new(),
            kind: RuleKind::Weekend,
            multiplier: mult(tenths),
            active: true,
        }
    }

    // 2026-06-09 is a Tuesday, 2026-06-10 a Wednesday, 2026-06-13 a Saturday.
    const TUE: (i32, u32, u32) = (2026, 6, 9);
    const WED: (i32, u32, u32) = (2026, 6, 10);
    const SAT: (i32, u32, u32) = (2026, 6, 13);

    #[test]
    fn simple_booking_no_rules() {
        let d = date(TUE.0, TUE.1, TUE.2);
        let q = quote(dec(1000), &[], &[], &SlotRange::new(d, tod(14), 2));
        assert_eq!(q.total, dec(2000));
        assert_eq!(q.hours, 2);
        assert!(q.applied_rules.is_empty());
        assert_eq!(q.summary.standard_hours, 2);
        assert_eq!(q.summary.premium_hours, 0);
    }

    #[test]
    fn peak_override_weekday_evening() {
        let d = date(WED.0, WED.1, WED.2);
        let rules = vec![peak(18, 21, DaySet::WEEKDAYS, 15)];
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(18), 2));
        let prices: Vec<Decimal> = q.breakdown.iter().map(|h| h.price).collect();
        assert_eq!(prices, vec![dec(1500), dec(1500)]);
        assert_eq!(q.total, dec(3000));
        assert_eq!(q.applied_rules.len(), 1);
        assert_eq!(q.summary.premium_hours, 2);
    }

    #[test]
    fn peak_rule_outside_window_or_day_never_applies() {
        let rules = vec![peak(18, 21, DaySet::WEEKDAYS, 15)];
        // Right day, wrong hour
        let d = date(WED.0, WED.1, WED.2);
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(10), 1));
        assert_eq!(q.total, dec(1000));
        // Right hour, wrong day (Saturday not in WEEKDAYS)
        let s = date(SAT.0, SAT.1, SAT.2);
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(s, tod(18), 1));
        assert_eq!(q.total, dec(1000));
    }

    #[test]
    fn window_end_is_exclusive() {
        let d = date(WED.0, WED.1, WED.2);
        let rules = vec![peak(18, 21, DaySet::WEEKDAYS, 15)];
        // 21:00 slot starts exactly at the window end — not peak
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(21), 1));
        assert_eq!(q.total, dec(1000));
        // 20:00 slot is the last peak hour
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(20), 1));
        assert_eq!(q.total, dec(1500));
    }

    #[test]
    fn max_combine_never_stacks() {
        let s = date(SAT.0, SAT.1, SAT.2);
        // Saturday evening matched by both peak (x1.5, all days) and weekend (x1.3)
        let rules = vec![peak(18, 21, DaySet::ALL, 15), weekend(13)];
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(s, tod(18), 1));
        // max(1.5, 1.3) — not 1.5 * 1.3 = 1.95, not 1.5 + 1.3
        assert_eq!(q.total, dec(1500));
        assert_eq!(q.breakdown[0].multiplier, mult(15));
    }

    #[test]
    fn weekend_rule_applies_saturday_sunday_only() {
        let rules = vec![weekend(13)];
        let s = date(SAT.0, SAT.1, SAT.2);
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(s, tod(10), 1));
        assert_eq!(q.total, dec(1300));
        let t = date(TUE.0, TUE.1, TUE.2);
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(t, tod(10), 1));
        assert_eq!(q.total, dec(1000));
    }

    #[test]
    fn inactive_rule_ignored() {
        let d = date(WED.0, WED.1, WED.2);
        let mut rule = peak(18, 21, DaySet::ALL, 20);
        rule.active = false;
        let q = quote(dec(1000), &[rule], &[], &SlotRange::new(d, tod(18), 1));
        assert_eq!(q.total, dec(1000));
        assert!(q.applied_rules.is_empty());
    }

    #[test]
    fn date_scoped_special_rule() {
        let d = date(WED.0, WED.1, WED.2);
        let rule = PricingRule {
            id: Ulid::new(),
            court_id: Ulid::new(),
            kind: RuleKind::Special {
                date: Some(d),
                days: DaySet::NONE,
            },
            multiplier: mult(20),
            active: true,
        };
        let q = quote(dec(1000), &[rule.clone()], &[], &SlotRange::new(d, tod(10), 1));
        assert_eq!(q.total, dec(2000));
        // Different date — no match
        let other = date(TUE.0, TUE.1, TUE.2);
        let q = quote(dec(1000), &[rule], &[], &SlotRange::new(other, tod(10), 1));
        assert_eq!(q.total, dec(1000));
    }

    #[test]
    fn holiday_beats_lower_rules() {
        let d = date(TUE.0, TUE.1, TUE.2);
        let holidays = vec![Holiday {
            date: d,
            name: "Founding Day".into(),
            multiplier: mult(20),
            active: true,
        }];
        let rules = vec![peak(8, 23, DaySet::ALL, 15)];
        let q = quote(dec(1000), &rules, &holidays, &SlotRange::new(d, tod(10), 1));
        assert_eq!(q.total, dec(2000));
        assert!(q.applied_rules[0].starts_with("holiday"));
    }

    #[test]
    fn inactive_holiday_ignored() {
        let d = date(TUE.0, TUE.1, TUE.2);
        let holidays = vec![Holiday {
            date: d,
            name: "Off".into(),
            multiplier: mult(30),
            active: false,
        }];
        let q = quote(dec(1000), &[], &holidays, &SlotRange::new(d, tod(10), 1));
        assert_eq!(q.total, dec(1000));
    }

    #[test]
    fn overnight_prices_each_hour_by_its_own_date() {
        // 23:00 + 3h on the 10th: hour 0 on the 10th, hours 1-2 on the 11th.
        let d = date(2026, 6, 10);
        let next = date(2026, 6, 11);
        let holidays = vec![Holiday {
            date: next,
            name: "Midsummer".into(),
            multiplier: mult(20),
            active: true,
        }];
        let q = quote(dec(1000), &[], &holidays, &SlotRange::new(d, tod(23), 3));
        let prices: Vec<Decimal> = q.breakdown.iter().map(|h| h.price).collect();
        assert_eq!(prices, vec![dec(1000), dec(2000), dec(2000)]);
        assert_eq!(q.total, dec(5000));
        assert_eq!(q.breakdown[0].date, d);
        assert_eq!(q.breakdown[1].date, next);
        // Holiday on the start date only: the wrapped hours stay standard
        let holidays = vec![Holiday {
            date: d,
            name: "Midsummer Eve".into(),
            multiplier: mult(20),
            active: true,
        }];
        let q = quote(dec(1000), &[], &holidays, &SlotRange::new(d, tod(23), 3));
        let prices: Vec<Decimal> = q.breakdown.iter().map(|h| h.price).collect();
        assert_eq!(prices, vec![dec(2000), dec(1000), dec(1000)]);
    }

    #[test]
    fn each_hour_rounds_before_summing() {
        // 333.33 * 1.5 = 499.995 rounds to the minor unit per hour; the
        // total must be twice the rounded hour, not round(2 * 499.995).
        let base = Decimal::new(33333, 2); // 333.33
        let d = date(WED.0, WED.1, WED.2);
        let rules = vec![peak(18, 21, DaySet::ALL, 15)];
        let q = quote(base, &rules, &[], &SlotRange::new(d, tod(18), 2));
        let per_hour = (base * mult(15)).round_dp(2);
        assert_eq!(q.breakdown[0].price, per_hour);
        assert_eq!(q.total, per_hour + per_hour);
        // at most 2 decimal places survive
        assert!(q.total.scale() <= 2);
    }

    #[test]
    fn quote_is_idempotent() {
        let d = date(SAT.0, SAT.1, SAT.2);
        let rules = vec![peak(18, 21, DaySet::ALL, 15), weekend(13)];
        let r = SlotRange::new(d, tod(17), 3);
        let a = quote(dec(1000), &rules, &[], &r);
        let b = quote(dec(1000), &rules, &[], &r);
        assert_eq!(a, b);
    }

    #[test]
    fn window_wrapping_midnight() {
        // 22:00-02:00 peak window catches 23:00 and 01:00 but not 14:00
        let d = date(WED.0, WED.1, WED.2);
        let rules = vec![PricingRule {
            id: Ulid::new(),
            court_id: Ulid::new(),
            kind: RuleKind::PeakHours {
                start: tod(22),
                end: tod(2),
                days: DaySet::ALL,
            },
            multiplier: mult(15),
            active: true,
        }];
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(23), 1));
        assert_eq!(q.total, dec(1500));
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(1), 1));
        assert_eq!(q.total, dec(1500));
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(14), 1));
        assert_eq!(q.total, dec(1000));
    }

    #[test]
    fn summary_splits_standard_and_premium() {
        let d = date(WED.0, WED.1, WED.2);
        let rules = vec![peak(18, 21, DaySet::ALL, 15)];
        // 17:00-20:00: one standard hour, two peak hours
        let q = quote(dec(1000), &rules, &[], &SlotRange::new(d, tod(17), 3));
        assert_eq!(q.summary.standard_hours, 1);
        assert_eq!(q.summary.premium_hours, 2);
        assert_eq!(q.summary.standard_subtotal, dec(1000));
        assert_eq!(q.summary.premium_subtotal, dec(3000));
        assert_eq!(q.total, dec(4000));
    }
}
