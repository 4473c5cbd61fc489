//! Synthetic order history whose discounts follow a hand-designed policy.
//!
//! The rules here are the ground truth the classifier is trained to reproduce. The
//! trainer never sees them; it only sees the orders they produce.

use chrono::{Days, Duration, NaiveDate, NaiveTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::menu::{MenuCatalog, MenuItem};
use crate::domain::order::{final_price, OrderId, SimulatedOrder};
use crate::errors::DomainError;
use crate::features::{is_peak_hour, CalendarSignals};

pub const OPEN_HOUR: u32 = 11;
pub const CLOSE_HOUR: u32 = 22;
const HOURS_PER_DAY: u32 = CLOSE_HOUR - OPEN_HOUR + 1;

const WEEKDAY_BASE_ORDERS: f64 = 80.0;
const WEEKEND_BASE_ORDERS: f64 = 104.0;
const MONTH_END_MULTIPLIER: f64 = 1.3;
const HOLIDAY_MULTIPLIER: f64 = 1.2;
const PEAK_HOUR_FACTOR: f64 = 1.5;
const OFF_PEAK_HOUR_FACTOR: f64 = 0.6;

const ITEM_COUNTS: [u32; 4] = [1, 2, 3, 4];
const ITEM_COUNT_WEIGHTS: [f64; 4] = [0.4, 0.35, 0.20, 0.05];

pub const INVENTORY_LEVELS: [u8; 6] = [20, 35, 50, 70, 85, 95];
const LOW_INVENTORY_PEAK_WEIGHT: f64 = 0.05;
const LOW_INVENTORY_OFF_PEAK_WEIGHT: f64 = 0.15;
const REMAINING_INVENTORY_WEIGHTS: [f64; 5] = [0.15, 0.25, 0.25, 0.20, 0.15];

const PEAK_NO_DISCOUNT_PROBABILITY: f64 = 0.95;
const PEAK_SMALL_DISCOUNTS: [u8; 2] = [5, 10];

const OFF_PEAK_BASE_PROBABILITY: f64 = 0.35;
const OFF_PEAK_MAX_PROBABILITY: f64 = 0.85;

const DURATION_MINUTES: std::ops::Range<u32> = 20..45;

struct DiscountTier {
    below_inventory: u8,
    levels: &'static [u8],
    weights: &'static [f64],
}

/// Lower inventory biases toward larger discounts. The last tier catches everything.
const DISCOUNT_TIERS: [DiscountTier; 4] = [
    DiscountTier { below_inventory: 30, levels: &[15, 20, 25], weights: &[0.3, 0.5, 0.2] },
    DiscountTier { below_inventory: 50, levels: &[10, 15, 20], weights: &[0.3, 0.45, 0.25] },
    DiscountTier { below_inventory: 75, levels: &[5, 10, 15], weights: &[0.4, 0.4, 0.2] },
    DiscountTier { below_inventory: u8::MAX, levels: &[5, 10], weights: &[0.6, 0.4] },
];

/// Expected number of orders for a calendar day.
pub fn day_volume(date: NaiveDate) -> f64 {
    let calendar = CalendarSignals::for_day(date, OPEN_HOUR);
    let mut volume =
        if calendar.is_weekend { WEEKEND_BASE_ORDERS } else { WEEKDAY_BASE_ORDERS };
    if calendar.is_month_end {
        volume *= MONTH_END_MULTIPLIER;
    }
    if calendar.is_holiday_season {
        volume *= HOLIDAY_MULTIPLIER;
    }
    volume
}

pub fn orders_for_hour(day_volume: f64, hour: u32) -> u32 {
    let factor = if is_peak_hour(hour) { PEAK_HOUR_FACTOR } else { OFF_PEAK_HOUR_FACTOR };
    let orders = (day_volume / f64::from(HOURS_PER_DAY) * factor).floor();
    if orders.is_finite() && orders > 0.0 {
        orders as u32
    } else {
        0
    }
}

/// Probability that an off-peak order receives any discount.
pub fn off_peak_discount_probability(inventory_level: u8, calendar: &CalendarSignals) -> f64 {
    let mut probability = OFF_PEAK_BASE_PROBABILITY;
    if inventory_level < 30 {
        probability += 0.35;
    } else if inventory_level < 50 {
        probability += 0.15;
    }
    if calendar.is_weekend {
        probability += 0.10;
    }
    if calendar.is_month_end {
        probability += 0.15;
    }
    probability.min(OFF_PEAK_MAX_PROBABILITY)
}

struct PolicyDistributions {
    item_count: WeightedIndex<f64>,
    inventory_peak: WeightedIndex<f64>,
    inventory_off_peak: WeightedIndex<f64>,
    tiers: Vec<WeightedIndex<f64>>,
}

impl PolicyDistributions {
    fn build() -> Result<Self, DomainError> {
        let tiers = DISCOUNT_TIERS
            .iter()
            .map(|tier| WeightedIndex::new(tier.weights.iter().copied()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(weight_error)?;

        Ok(Self {
            item_count: WeightedIndex::new(ITEM_COUNT_WEIGHTS).map_err(weight_error)?,
            inventory_peak: inventory_distribution(LOW_INVENTORY_PEAK_WEIGHT)?,
            inventory_off_peak: inventory_distribution(LOW_INVENTORY_OFF_PEAK_WEIGHT)?,
            tiers,
        })
    }
}

fn inventory_distribution(low_weight: f64) -> Result<WeightedIndex<f64>, DomainError> {
    let remaining_total: f64 = REMAINING_INVENTORY_WEIGHTS.iter().sum();
    let weights = std::iter::once(low_weight).chain(
        REMAINING_INVENTORY_WEIGHTS.iter().map(|weight| weight / remaining_total * (1.0 - low_weight)),
    );
    WeightedIndex::new(weights).map_err(weight_error)
}

fn weight_error(error: rand::distributions::WeightedError) -> DomainError {
    DomainError::InvariantViolation(format!("invalid simulator weight table: {error}"))
}

pub struct PolicySimulator {
    catalog: MenuCatalog,
    distributions: PolicyDistributions,
    seed: Option<u64>,
    anchor: NaiveDate,
    rng: StdRng,
}

impl PolicySimulator {
    /// Unseeded simulators draw from OS entropy and differ between runs.
    pub fn new(catalog: MenuCatalog, seed: Option<u64>) -> Result<Self, DomainError> {
        Ok(Self {
            catalog,
            distributions: PolicyDistributions::build()?,
            seed,
            anchor: Utc::now().date_naive(),
            rng: rng_for(seed),
        })
    }

    /// Days are generated in `[anchor - num_days, anchor)`.
    pub fn anchored_at(mut self, anchor: NaiveDate) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.rng = rng_for(self.seed);
    }

    pub fn catalog(&self) -> &MenuCatalog {
        &self.catalog
    }

    /// Lazily produces every order for `num_days` days. A seeded simulator restarts its
    /// random stream on each call, so repeated calls yield the same history.
    ///
    /// Fails when the window reaches before the earliest representable date.
    pub fn simulate(&mut self, num_days: u32) -> Result<SimulatedOrders<'_>, DomainError> {
        let out_of_range = || {
            DomainError::InvariantViolation(format!(
                "a {num_days}-day simulation window before {} is out of range",
                self.anchor
            ))
        };
        let total_slots = num_days.checked_mul(HOURS_PER_DAY).ok_or_else(out_of_range)?;
        let start =
            self.anchor.checked_sub_days(Days::new(u64::from(num_days))).ok_or_else(out_of_range)?;

        if self.seed.is_some() {
            self.rng = rng_for(self.seed);
        }
        debug!(
            event_name = "simulator.run.start",
            num_days,
            start = %start,
            seeded = self.seed.is_some(),
            "starting synthetic order simulation"
        );
        Ok(SimulatedOrders {
            simulator: self,
            start,
            total_slots,
            next_slot: 0,
            current: None,
            remaining_in_slot: 0,
            produced: 0,
        })
    }

    fn synthesize(&mut self, date: NaiveDate, hour: u32, index: u64) -> SimulatedOrder {
        let minute = self.rng.gen_range(0..60);
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
        let timestamp = date.and_time(time);
        let calendar = CalendarSignals::for_day(date, hour);
        let peak = calendar.is_peak();

        let requested = ITEM_COUNTS[self.distributions.item_count.sample(&mut self.rng)];
        let items = self.pick_items(requested as usize);
        let total_price: Decimal = items.iter().map(|item| item.price).sum();

        let inventory_level = self.sample_inventory(peak);
        let discount_applied = self.sample_discount(peak, inventory_level, &calendar);

        SimulatedOrder {
            order_id: OrderId(format!("order_{index}")),
            timestamp,
            hour,
            day_of_week: calendar.day_of_week,
            is_weekend: calendar.is_weekend,
            is_lunch_peak: calendar.is_lunch_peak,
            is_dinner_peak: calendar.is_dinner_peak,
            is_month_end: calendar.is_month_end,
            is_holiday_season: calendar.is_holiday_season,
            inventory_level,
            num_items: items.len() as u32,
            items: items.into_iter().map(|item| item.id).collect(),
            total_price,
            discount_applied,
            final_price: final_price(total_price, discount_applied),
            order_duration_minutes: self.rng.gen_range(DURATION_MINUTES),
        }
    }

    fn pick_items(&mut self, requested: usize) -> Vec<MenuItem> {
        let amount = requested.min(self.catalog.len());
        let items = self.catalog.items();
        match items.choose_multiple_weighted(&mut self.rng, amount, |item| item.popularity) {
            Ok(chosen) => chosen.cloned().collect(),
            // Catalog weights are validated positive, so this only guards custom builds.
            Err(_) => items.choose_multiple(&mut self.rng, amount).cloned().collect(),
        }
    }

    fn sample_inventory(&mut self, peak: bool) -> u8 {
        let distribution = if peak {
            &self.distributions.inventory_peak
        } else {
            &self.distributions.inventory_off_peak
        };
        INVENTORY_LEVELS[distribution.sample(&mut self.rng)]
    }

    fn sample_discount(&mut self, peak: bool, inventory_level: u8, calendar: &CalendarSignals) -> u8 {
        if peak {
            if self.rng.gen_bool(PEAK_NO_DISCOUNT_PROBABILITY) {
                return 0;
            }
            return if self.rng.gen_bool(0.5) { PEAK_SMALL_DISCOUNTS[0] } else { PEAK_SMALL_DISCOUNTS[1] };
        }

        let probability = off_peak_discount_probability(inventory_level, calendar);
        if self.rng.gen::<f64>() >= probability {
            return 0;
        }

        let tier_index = DISCOUNT_TIERS
            .iter()
            .position(|tier| inventory_level < tier.below_inventory)
            .unwrap_or(DISCOUNT_TIERS.len() - 1);
        let level = self.distributions.tiers[tier_index].sample(&mut self.rng);
        DISCOUNT_TIERS[tier_index].levels[level]
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Finite iterator over simulated orders, one operating hour at a time.
pub struct SimulatedOrders<'a> {
    simulator: &'a mut PolicySimulator,
    start: NaiveDate,
    total_slots: u32,
    next_slot: u32,
    current: Option<(NaiveDate, u32)>,
    remaining_in_slot: u32,
    produced: u64,
}

impl Iterator for SimulatedOrders<'_> {
    type Item = SimulatedOrder;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining_in_slot == 0 {
            if self.next_slot >= self.total_slots {
                return None;
            }
            let date = self.start + Duration::days(i64::from(self.next_slot / HOURS_PER_DAY));
            let hour = OPEN_HOUR + self.next_slot % HOURS_PER_DAY;
            self.remaining_in_slot = orders_for_hour(day_volume(date), hour);
            self.current = Some((date, hour));
            self.next_slot += 1;
        }

        let (date, hour) = self.current?;
        self.remaining_in_slot -= 1;
        let order = self.simulator.synthesize(date, hour, self.produced);
        self.produced += 1;
        Some(order)
    }
}
