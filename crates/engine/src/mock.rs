//! In-memory collaborators for synchronizer tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{
    Error, ExecutionLayer, ExecutionResult, Interval, MarketDataSource, PartialSample,
    PositionQuery, Result, RuleId, Side, Timeframe,
};

pub fn intervals_from(start: DateTime<Utc>, tf: Timeframe, closes: &[f64]) -> Vec<Interval> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Interval {
            timestamp: start + tf.duration() * i as i32,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
        })
        .collect()
}

pub struct MockMarket {
    intervals: Mutex<Vec<Interval>>,
    samples: Mutex<VecDeque<PartialSample>>,
    sample_delay: Option<std::time::Duration>,
}

impl MockMarket {
    pub fn with_closes(start: DateTime<Utc>, tf: Timeframe, closes: &[f64]) -> Self {
        Self {
            intervals: Mutex::new(intervals_from(start, tf, closes)),
            samples: Mutex::new(VecDeque::new()),
            sample_delay: None,
        }
    }

    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.sample_delay = Some(delay);
        self
    }

    pub fn push_closed(&self, interval: Interval) {
        self.intervals.lock().unwrap().push(interval);
    }

    pub fn push_sample(&self, sample: PartialSample) {
        self.samples.lock().unwrap().push_back(sample);
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn fetch_closed_intervals(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Interval>> {
        Ok(self
            .intervals
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.timestamp >= from && c.timestamp < to)
            .copied()
            .collect())
    }

    async fn fetch_partial_sample(&self, symbol: &str) -> Result<PartialSample> {
        if let Some(delay) = self.sample_delay {
            tokio::time::sleep(delay).await;
        }
        self.samples
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::MissingSample(format!("no sample queued for {symbol}")))
    }
}

/// Fills every order at a fixed price and keeps a signed position.
pub struct MockExchange {
    pub position: Mutex<f64>,
    pub fail_next: AtomicBool,
    pub submitted: Mutex<Vec<String>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            position: Mutex::new(0.0),
            fail_next: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_position(&self, quantity: f64) {
        *self.position.lock().unwrap() = quantity;
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    fn fill(&self, symbol: &str, label: String, new_position: f64) -> Result<ExecutionResult> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Exchange("rejected".into()));
        }
        let previous = std::mem::replace(&mut *self.position.lock().unwrap(), new_position);
        self.submitted.lock().unwrap().push(label);
        let side = if new_position > previous {
            common::OrderSide::Buy
        } else {
            common::OrderSide::Sell
        };
        Ok(ExecutionResult {
            order_id: format!("mock-{}", self.submitted.lock().unwrap().len()),
            symbol: symbol.to_string(),
            side,
            fill_price: 100.0,
            quantity: 1.0,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExecutionLayer for MockExchange {
    async fn submit_enter(&self, symbol: &str, side: Side, rule: RuleId) -> Result<ExecutionResult> {
        let quantity = match side {
            Side::Long => 1.0,
            Side::Short => -1.0,
        };
        self.fill(symbol, format!("enter {side} {rule}"), quantity)
    }

    async fn submit_exit(&self, symbol: &str, rule: RuleId) -> Result<ExecutionResult> {
        self.fill(symbol, format!("exit {rule}"), 0.0)
    }

    async fn submit_stop(
        &self,
        symbol: &str,
        rule: RuleId,
        price_level: f64,
    ) -> Result<ExecutionResult> {
        self.fill(symbol, format!("stop {rule} @ {price_level}"), 0.0)
    }
}

#[async_trait]
impl PositionQuery for MockExchange {
    async fn current_position(&self, _symbol: &str) -> Result<f64> {
        Ok(*self.position.lock().unwrap())
    }
}
