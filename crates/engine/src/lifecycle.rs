use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use common::{
    Config, Error, Interval, JournalEntry, MarketDataSource, PositionState, Result, Side,
    SyncEvent, SyncState, Timeframe,
};
use strategy::{Evaluation, FabStrategy};

use crate::accumulator::PartialIntervalAccumulator;
use crate::executor::{ActionExecutor, Corroboration};

/// Per-symbol loop settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Upper bound on any single exchange fetch within a tick.
    pub fetch_timeout: Duration,
    /// Wait past each minute boundary so the exchange has published the candle.
    pub settle_delay: Duration,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe,
            fetch_timeout: cfg.fetch_timeout,
            settle_delay: cfg.settle_delay,
        }
    }
}

/// Requests the running synchronizer picks up between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Adopt the exchange's position as the internal one.
    Reconcile,
}

/// Cloneable handle to a running `Synchronizer`.
#[derive(Clone)]
pub struct SyncHandle {
    symbol: String,
    stop_tx: Arc<watch::Sender<bool>>,
    command_tx: mpsc::Sender<SyncCommand>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// Request a cooperative stop. Nothing is dispatched after the loop sees it;
    /// an action already handed to the execution layer is not revoked.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub async fn reconcile(&self) {
        let _ = self.command_tx.send(SyncCommand::Reconcile).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

/// Keeps one symbol's series, indicators and position in step with the
/// exchange.
///
/// Each tick is either a *partial* tick (the current interval is still
/// forming: fold a 1-minute sample into a provisional interval and evaluate
/// the partial rule book) or a *closing* tick (the interval has closed:
/// replace the provisional interval with the exchange's closed one and
/// evaluate the closing rule book). All mutation happens on the task that
/// owns this value.
pub struct Synchronizer {
    settings: SyncSettings,
    strategy: FabStrategy,
    market: Arc<dyn MarketDataSource>,
    executor: ActionExecutor,
    accumulator: PartialIntervalAccumulator,
    position: PositionState,
    state: SyncState,
    journal: Vec<JournalEntry>,
    /// Open time of the newest closed interval in the series.
    last_closed: Option<DateTime<Utc>>,
    /// True while the series tail is a provisional interval.
    has_partial: bool,
    events: broadcast::Sender<SyncEvent>,
    stop_rx: watch::Receiver<bool>,
    command_rx: mpsc::Receiver<SyncCommand>,
}

impl Synchronizer {
    pub fn new(
        settings: SyncSettings,
        strategy: FabStrategy,
        market: Arc<dyn MarketDataSource>,
        executor: ActionExecutor,
    ) -> (Self, SyncHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(8);
        let (events, _) = broadcast::channel(256);

        let handle = SyncHandle {
            symbol: settings.symbol.clone(),
            stop_tx: Arc::new(stop_tx),
            command_tx,
            events: events.clone(),
        };

        let sync = Synchronizer {
            settings,
            strategy,
            market,
            executor,
            accumulator: PartialIntervalAccumulator::new(),
            position: PositionState::flat(),
            state: SyncState::Idle,
            journal: Vec::new(),
            last_closed: None,
            has_partial: false,
            events,
            stop_rx,
            command_rx,
        };

        (sync, handle)
    }

    /// Replace the series with closed history and rebuild indicators.
    pub fn load_history(&mut self, intervals: Vec<Interval>) {
        self.strategy.load(intervals);
        self.last_closed = self.strategy.series().last().map(|c| c.timestamp);
        self.has_partial = false;
        self.accumulator.reset();

        if let Err(e) = self.strategy.check_warm() {
            warn!(symbol = %self.settings.symbol, error = %e, "Rules stay silent until warm");
        }
        info!(
            symbol = %self.settings.symbol,
            intervals = self.strategy.series().len(),
            last_closed = ?self.last_closed,
            "History loaded"
        );
    }

    pub fn position(&self) -> PositionState {
        self.position
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn strategy(&self) -> &FabStrategy {
        &self.strategy
    }

    /// Adopt the exchange's side as the internal position. The opening rule
    /// of an adopted position is unknown.
    pub async fn reconcile(&mut self) -> Result<PositionState> {
        let symbol = self.settings.symbol.clone();
        let quantity = self
            .bounded("position query", self.executor.external_position(&symbol))
            .await?;

        let side = Side::from_quantity(quantity);
        if side != self.position.side {
            let adopted = PositionState {
                side,
                opening_rule: None,
            };
            info!(
                symbol = %symbol,
                from = %self.position,
                to = %adopted,
                quantity,
                "Reconciled position with exchange"
            );
            self.position = adopted;
        }
        Ok(self.position)
    }

    /// Run one tick as of `now`.
    pub async fn step(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.stop_requested() {
            self.set_state(SyncState::Stopped);
            return Ok(());
        }

        let last_closed = self
            .last_closed
            .ok_or_else(|| Error::MissingSample("no closed intervals loaded".into()))?;
        let forming_open = last_closed + self.settings.timeframe.duration();
        let elapsed = now - forming_open;

        if elapsed < self.settings.timeframe.duration() {
            self.partial_tick(forming_open).await
        } else {
            self.closing_tick(forming_open, now).await
        }
    }

    async fn partial_tick(&mut self, forming_open: DateTime<Utc>) -> Result<()> {
        self.set_state(SyncState::AccumulatingPartialInterval);

        let symbol = self.settings.symbol.clone();
        let sample = self
            .bounded("partial sample fetch", self.market.fetch_partial_sample(&symbol))
            .await?;
        self.emit(SyncEvent::PriceUpdate {
            symbol: symbol.clone(),
            price: sample.close,
            timestamp: sample.timestamp,
        });

        if sample.timestamp < forming_open {
            self.skip(format!(
                "sample at {} predates forming interval {forming_open}",
                sample.timestamp
            ));
            return Ok(());
        }

        self.accumulator.fold(sample);
        let Some(provisional) = self.accumulator.synthesize(forming_open) else {
            return Ok(());
        };
        if self.has_partial {
            self.strategy.update_partial(provisional)?;
        } else {
            self.strategy.push_partial(provisional)?;
            self.has_partial = true;
        }
        debug!(
            symbol = %symbol,
            samples = self.accumulator.sample_count(),
            close = provisional.close,
            "Provisional interval updated"
        );

        let eval = self.strategy.evaluate_partial(&self.position);
        self.act_on(eval).await
    }

    async fn closing_tick(&mut self, forming_open: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        self.set_state(SyncState::IntervalClosing);

        let symbol = self.settings.symbol.clone();
        let timeframe = self.settings.timeframe;
        let closed = self
            .bounded(
                "closed interval fetch",
                self.market
                    .fetch_closed_intervals(&symbol, timeframe, forming_open, now),
            )
            .await?;
        if closed.is_empty() {
            self.skip("closed interval not published yet".to_string());
            return Ok(());
        }

        if self.has_partial {
            self.strategy.discard_partial();
            self.has_partial = false;
        }
        self.accumulator.reset();

        let mut appended = 0usize;
        for interval in closed {
            match self.strategy.append_closed(interval) {
                Ok(()) => {
                    appended += 1;
                    self.last_closed = Some(interval.timestamp);
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "Dropping closed interval"),
            }
        }
        self.strategy.refresh();
        info!(symbol = %symbol, appended, last_closed = ?self.last_closed, "Interval closed");
        if let Some(last) = self.strategy.series().last() {
            self.emit(SyncEvent::PriceUpdate {
                symbol: symbol.clone(),
                price: last.close,
                timestamp: last.timestamp,
            });
        }

        let outcome = if appended > 0 {
            let eval = self.strategy.evaluate_closing(&self.position);
            self.act_on(eval).await
        } else {
            Ok(())
        };
        self.set_state(SyncState::Idle);
        outcome
    }

    /// Publish fired signals and dispatch the winning action, if any.
    async fn act_on(&mut self, eval: Evaluation) -> Result<()> {
        let symbol = self.settings.symbol.clone();
        for signal in eval.fired {
            info!(
                symbol = %symbol,
                rule = %signal.rule,
                kind = %signal.kind,
                index = signal.index,
                price = signal.price,
                "Signal fired"
            );
            self.emit(SyncEvent::SignalFired {
                symbol: symbol.clone(),
                signal,
            });
        }

        let Some(decision) = eval.decision else {
            return Ok(());
        };
        if self.stop_requested() {
            info!(symbol = %symbol, action = %decision.action, "Stop requested, action not dispatched");
            return Ok(());
        }

        let internal = self.position;
        let check = self
            .bounded("position query", self.executor.corroborate(&symbol, &internal))
            .await?;
        if let Corroboration::Mismatch { external_quantity } = check {
            self.emit(SyncEvent::PositionMismatch {
                symbol: symbol.clone(),
                internal,
                external_quantity,
            });
            return Err(Error::InconsistentPosition {
                symbol,
                internal,
                external_quantity,
            });
        }

        let action = decision.action;
        match self.executor.dispatch(&symbol, &action).await {
            Ok(result) => {
                self.position = action.resulting_position();
                self.journal.push(JournalEntry {
                    side: action.side(),
                    action,
                    timestamp: result.timestamp,
                    price: result.fill_price,
                    rule: action.rule(),
                });
                info!(symbol = %symbol, position = %self.position, "Position updated");
                self.emit(SyncEvent::ActionDispatched {
                    symbol,
                    action,
                    result,
                });
                Ok(())
            }
            Err(e) => {
                self.emit(SyncEvent::ActionFailed {
                    symbol,
                    action,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Await `fut` for at most `fetch_timeout`. Failures become `TickSkipped`.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.fetch_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.skip(format!("{what} failed: {e}"));
                Err(e)
            }
            Err(_) => {
                let reason = format!(
                    "{what} timed out after {}s",
                    self.settings.fetch_timeout.as_secs_f64()
                );
                self.skip(reason.clone());
                Err(Error::MissingSample(reason))
            }
        }
    }

    fn skip(&self, reason: String) {
        warn!(symbol = %self.settings.symbol, reason = %reason, "Tick skipped");
        self.emit(SyncEvent::TickSkipped {
            symbol: self.settings.symbol.clone(),
            reason,
        });
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state == state {
            return;
        }
        debug!(symbol = %self.settings.symbol, from = %self.state, to = %state, "State change");
        self.state = state;
        self.emit(SyncEvent::StateChanged {
            symbol: self.settings.symbol.clone(),
            state,
        });
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Drive ticks aligned to minute boundaries until stopped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            symbol = %self.settings.symbol,
            timeframe = %self.settings.timeframe,
            "Synchronizer running"
        );

        loop {
            if self.stop_requested() {
                break;
            }

            while let Ok(command) = self.command_rx.try_recv() {
                match command {
                    SyncCommand::Reconcile => {
                        if let Err(e) = self.reconcile().await {
                            warn!(symbol = %self.settings.symbol, error = %e, "Reconcile failed");
                        }
                    }
                }
            }

            if let Err(e) = self.step(Utc::now()).await {
                warn!(symbol = %self.settings.symbol, error = %e, "Tick failed");
            }
            if self.stop_requested() {
                break;
            }

            let wait = until_next_minute(Utc::now()) + self.settings.settle_delay;
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = self.stop_rx.changed() => {
                    if changed.is_err() {
                        warn!(symbol = %self.settings.symbol, "Synchronizer handle dropped, stopping");
                        break;
                    }
                }
            }
        }

        self.set_state(SyncState::Stopped);
        info!(symbol = %self.settings.symbol, "Synchronizer stopped");
    }
}

/// Time left until the next wall-clock minute boundary.
pub fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = now.timestamp_millis().rem_euclid(60_000) as u64;
    Duration::from_millis(60_000 - into_minute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use common::{Action, PartialSample, RuleId, SignalKind};
    use strategy::config::{AdaptiveConfig, WindowConfig};
    use strategy::StrategyConfig;

    use crate::mock::{intervals_from, MockExchange, MockMarket};

    fn tf() -> Timeframe {
        Timeframe::from_minutes(5)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at_bar(i: i32) -> DateTime<Utc> {
        start() + tf().duration() * i
    }

    /// short = close, mid = 2-bar mean, long and filters = 3-bar mean.
    fn tiny_strategy() -> FabStrategy {
        FabStrategy::new(StrategyConfig {
            windows: WindowConfig {
                short: 1,
                mid: 2,
                long: 3,
                filter1: 3,
                filter2: 3,
                filter3: 1,
            },
            round_prices: false,
            adaptive: AdaptiveConfig {
                enabled: false,
                ..AdaptiveConfig::default()
            },
            ..StrategyConfig::default()
        })
    }

    struct Harness {
        sync: Synchronizer,
        handle: SyncHandle,
        market: Arc<MockMarket>,
        exchange: Arc<MockExchange>,
    }

    /// History closes at bars 0..=4; bar 5 (close 12) completes a Rule 3
    /// buy entry once it is fetched.
    fn harness() -> Harness {
        let market = Arc::new(MockMarket::with_closes(
            start(),
            tf(),
            &[10.0, 10.0, 10.0, 4.0, 10.0, 12.0],
        ));
        let exchange = Arc::new(MockExchange::new());
        let settings = SyncSettings {
            symbol: "BTCUSDT".into(),
            timeframe: tf(),
            fetch_timeout: Duration::from_millis(50),
            settle_delay: Duration::from_secs(0),
        };
        let executor = ActionExecutor::new(exchange.clone(), exchange.clone());
        let (mut sync, handle) =
            Synchronizer::new(settings, tiny_strategy(), market.clone(), executor);
        sync.load_history(intervals_from(start(), tf(), &[10.0, 10.0, 10.0, 4.0, 10.0]));
        Harness {
            sync,
            handle,
            market,
            exchange,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn sample(minute: i64, close: f64, volume: f64) -> PartialSample {
        PartialSample {
            timestamp: at_bar(5) + ChronoDuration::minutes(minute),
            open: close - 0.5,
            high: close + 0.5,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[tokio::test]
    async fn closing_tick_enters_and_journals() {
        let mut h = harness();
        let mut events = h.handle.subscribe();

        // Bar 5 closed 30s ago.
        let now = at_bar(6) + ChronoDuration::seconds(30);
        h.sync.step(now).await.unwrap();

        assert_eq!(h.sync.position(), PositionState::opened(Side::Long, RuleId::Rule3));
        assert_eq!(h.sync.state(), SyncState::Idle);
        assert_eq!(h.sync.journal().len(), 1);
        assert_eq!(h.sync.journal()[0].rule, RuleId::Rule3);
        assert_eq!(h.exchange.submitted(), vec!["enter Long Rule 3".to_string()]);

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::SignalFired { signal, .. }
                if signal.kind == SignalKind::BuyEnter && signal.rule == RuleId::Rule3
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SyncEvent::ActionDispatched {
                action: Action::Enter { side: Side::Long, rule: RuleId::Rule3 },
                ..
            }
        )));
    }

    #[tokio::test]
    async fn partial_ticks_build_and_replace_provisional_interval() {
        let mut h = harness();
        let mut events = h.handle.subscribe();
        h.market.push_sample(sample(0, 11.0, 2.0));
        h.market.push_sample(sample(1, 11.5, 3.0));

        h.sync.step(at_bar(5) + ChronoDuration::seconds(62)).await.unwrap();
        assert_eq!(h.sync.state(), SyncState::AccumulatingPartialInterval);
        assert_eq!(h.sync.strategy().series().len(), 6);

        h.sync.step(at_bar(5) + ChronoDuration::seconds(122)).await.unwrap();
        let tail = h.sync.strategy().series().last().unwrap();
        assert_eq!(h.sync.strategy().series().len(), 6);
        assert_eq!(tail.timestamp, at_bar(5));
        assert_eq!(tail.close, 11.5);
        assert_eq!(tail.volume, 5.0);
        assert_eq!(tail.open, 10.5);
        assert_eq!(h.sync.strategy().indicators().len(), 6);

        let prices: Vec<f64> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                SyncEvent::PriceUpdate { price, .. } => Some(price),
                _ => None,
            })
            .collect();
        assert_eq!(prices, vec![11.0, 11.5]);
        // Nothing traded on the partial book here.
        assert!(h.exchange.submitted().is_empty());

        // Closing replaces the provisional bar with the exchange's.
        h.sync.step(at_bar(6) + ChronoDuration::seconds(5)).await.unwrap();
        let tail = h.sync.strategy().series().last().unwrap();
        assert_eq!(h.sync.strategy().series().len(), 6);
        assert_eq!(tail.close, 12.0);
    }

    /// Closes 96 96 102 100 102 with tight lows: price holds above the long MA
    /// while mid sits below it. A dip to 102 on the forming bar retests long.
    fn rule_2_history() -> Vec<Interval> {
        [96.0, 96.0, 102.0, 100.0, 102.0]
            .iter()
            .enumerate()
            .map(|(i, &close)| Interval {
                timestamp: at_bar(i as i32),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn partial_rule_2_entry_then_closing_stop() {
        // The exchange closes bar 5 at 96, below both mid and long.
        let market = Arc::new(MockMarket::with_closes(
            start(),
            tf(),
            &[96.0, 96.0, 102.0, 100.0, 102.0, 96.0],
        ));
        let exchange = Arc::new(MockExchange::new());
        let settings = SyncSettings {
            symbol: "BTCUSDT".into(),
            timeframe: tf(),
            fetch_timeout: Duration::from_millis(50),
            settle_delay: Duration::from_secs(0),
        };
        let executor = ActionExecutor::new(exchange.clone(), exchange.clone());
        let (mut sync, handle) =
            Synchronizer::new(settings, tiny_strategy(), market.clone(), executor);
        let mut events = handle.subscribe();
        sync.load_history(rule_2_history());

        market.push_sample(PartialSample {
            timestamp: at_bar(5),
            open: 102.5,
            high: 105.5,
            low: 102.0,
            close: 105.0,
            volume: 3.0,
        });
        sync.step(at_bar(5) + ChronoDuration::seconds(62)).await.unwrap();

        assert_eq!(sync.position(), PositionState::opened(Side::Long, RuleId::Rule2));
        assert_eq!(exchange.submitted(), vec!["enter Long Rule 2".to_string()]);
        let partial = drain(&mut events);
        assert!(partial.iter().any(|e| matches!(
            e,
            SyncEvent::SignalFired { signal, .. }
                if signal.kind == SignalKind::BuyEnter
                    && signal.rule == RuleId::Rule2
                    && signal.index == 5
        )));
        assert!(partial.iter().any(|e| matches!(
            e,
            SyncEvent::ActionDispatched {
                action: Action::Enter { side: Side::Long, rule: RuleId::Rule2 },
                ..
            }
        )));

        sync.step(at_bar(6) + ChronoDuration::seconds(5)).await.unwrap();

        assert!(sync.position().is_flat());
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.strategy().series().last().unwrap().close, 96.0);
        assert_eq!(
            exchange.submitted(),
            vec!["enter Long Rule 2".to_string(), "stop Rule 2 @ 96".to_string()]
        );

        let journal = sync.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(
            journal[0].action,
            Action::Enter {
                side: Side::Long,
                rule: RuleId::Rule2
            }
        );
        assert_eq!(
            journal[1].action,
            Action::Stop {
                side: Side::Long,
                rule: RuleId::Rule2,
                price_level: 96.0
            }
        );
        assert_eq!(journal[1].side, Side::Long);

        let closing = drain(&mut events);
        assert!(closing.iter().any(|e| matches!(
            e,
            SyncEvent::SignalFired { signal, .. }
                if signal.kind == SignalKind::BuyStop && signal.rule == RuleId::Rule2
        )));
        assert!(closing.iter().any(|e| matches!(
            e,
            SyncEvent::ActionDispatched {
                action: Action::Stop { side: Side::Long, rule: RuleId::Rule2, .. },
                ..
            }
        )));
    }

    #[tokio::test]
    async fn mismatch_skips_action_until_reconciled() {
        let mut h = harness();
        let mut events = h.handle.subscribe();
        h.exchange.set_position(-2.0);

        let now = at_bar(6) + ChronoDuration::seconds(30);
        let err = h.sync.step(now).await.unwrap_err();
        assert!(matches!(err, Error::InconsistentPosition { .. }));
        assert!(h.sync.position().is_flat());
        assert!(h.exchange.submitted().is_empty());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::PositionMismatch { external_quantity, .. } if *external_quantity == -2.0)));

        let adopted = h.sync.reconcile().await.unwrap();
        assert_eq!(adopted.side, Some(Side::Short));
        assert_eq!(adopted.opening_rule, None);
    }

    #[tokio::test]
    async fn failed_execution_keeps_position() {
        let mut h = harness();
        let mut events = h.handle.subscribe();
        h.exchange.fail_next.store(true, Ordering::SeqCst);

        let now = at_bar(6) + ChronoDuration::seconds(30);
        assert!(h.sync.step(now).await.is_err());
        assert!(h.sync.position().is_flat());
        assert!(h.sync.journal().is_empty());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::ActionFailed { .. })));
    }

    #[tokio::test]
    async fn unpublished_close_skips_tick() {
        let mut h = harness();
        let mut events = h.handle.subscribe();
        // Bar 6 has closed but the exchange has not published it.
        let now = at_bar(7) + ChronoDuration::seconds(10);
        h.sync.step(now).await.unwrap();
        h.sync.step(now).await.unwrap();
        let before = h.sync.strategy().series().len();

        h.sync.step(now + ChronoDuration::minutes(5)).await.unwrap();
        assert_eq!(h.sync.strategy().series().len(), before);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::TickSkipped { .. })));

        h.market.push_closed(intervals_from(at_bar(6), tf(), &[13.0])[0]);
        h.sync.step(now + ChronoDuration::minutes(5)).await.unwrap();
        assert_eq!(h.sync.strategy().series().len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_is_bounded() {
        let market = Arc::new(
            MockMarket::with_closes(start(), tf(), &[10.0, 10.0, 10.0])
                .slow(Duration::from_secs(30)),
        );
        market.push_sample(sample(0, 11.0, 1.0));
        let exchange = Arc::new(MockExchange::new());
        let settings = SyncSettings {
            symbol: "BTCUSDT".into(),
            timeframe: tf(),
            fetch_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_secs(0),
        };
        let executor = ActionExecutor::new(exchange.clone(), exchange);
        let (mut sync, handle) = Synchronizer::new(settings, tiny_strategy(), market, executor);
        let mut events = handle.subscribe();
        sync.load_history(intervals_from(start(), tf(), &[10.0, 10.0, 10.0]));

        let err = sync.step(at_bar(3) + ChronoDuration::seconds(61)).await.unwrap_err();
        assert!(matches!(err, Error::MissingSample(_)));
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, SyncEvent::TickSkipped { reason, .. } if reason.contains("timed out"))));
    }

    #[tokio::test]
    async fn stop_halts_ticks_and_run() {
        let mut h = harness();
        h.handle.stop();
        h.sync.step(at_bar(6) + ChronoDuration::seconds(30)).await.unwrap();
        assert_eq!(h.sync.state(), SyncState::Stopped);
        assert!(h.exchange.submitted().is_empty());

        // run() returns immediately once stopped.
        tokio::time::timeout(Duration::from_secs(1), h.sync.run())
            .await
            .unwrap();
    }

    #[test]
    fn next_minute_wait() {
        let now = start() + ChronoDuration::milliseconds(45_500);
        assert_eq!(until_next_minute(now), Duration::from_millis(14_500));
        assert_eq!(until_next_minute(start()), Duration::from_secs(60));
    }
}
