#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tollgate_core::{
    agent::{PaymentAgent, SeizeOutcome, SeizeRequest, TopUpOutcome, TopUpRequest},
    config::GateConfig,
    types::WalletKey,
};
use tollgate_paywall::store::SessionStore;

/// How the agent answers one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed,
    Reject,
    Unreachable,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    TopUp(TopUpRequest),
    Seize(SeizeRequest),
}

#[derive(Debug, thiserror::Error)]
#[error("payment agent unreachable")]
pub struct Unreachable;

#[derive(Debug)]
struct Script {
    top_ups: VecDeque<Step>,
    top_up_default: Step,
    seize: Step,
    delay: Duration,
}

/// In-memory [`PaymentAgent`] answering from a script. Clones share the script and the
/// call log.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(top_up_default: Step) -> Self {
        ScriptedAgent {
            script: Arc::new(Mutex::new(Script {
                top_ups: VecDeque::new(),
                top_up_default,
                seize: Step::Succeed,
                delay: Duration::ZERO,
            })),
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Step::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(Step::Reject)
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().delay = delay;
        self
    }

    pub fn with_seize(self, step: Step) -> Self {
        self.script.lock().unwrap().seize = step;
        self
    }

    /// Answer the next top-ups with `steps`, then fall back to the default.
    pub fn then(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().top_ups.extend(steps);
        self
    }

    pub fn set_default(&self, step: Step) {
        self.script.lock().unwrap().top_up_default = step;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn top_up_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::TopUp(_)))
            .count()
    }

    pub fn seize_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Seize(_)))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, call: Call) -> Step {
        let (step, delay) = {
            let mut script = self.script.lock().unwrap();
            let step = match call {
                Call::TopUp(_) => script.top_ups.pop_front().unwrap_or(script.top_up_default),
                Call::Seize(_) => script.seize,
            };
            (step, script.delay)
        };
        self.calls.lock().unwrap().push(call);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if step == Step::Hang {
            std::future::pending::<()>().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        step
    }
}

impl PaymentAgent for ScriptedAgent {
    type Error = Unreachable;

    async fn top_up(&self, request: TopUpRequest) -> Result<TopUpOutcome, Self::Error> {
        let reference = format!("top-up-{}", self.top_up_count() + 1);
        match self.answer(Call::TopUp(request)).await {
            Step::Succeed => Ok(TopUpOutcome::success(reference)),
            Step::Reject => Ok(TopUpOutcome::failed("insufficient allowance")),
            Step::Unreachable | Step::Hang => Err(Unreachable),
        }
    }

    async fn seize(&self, request: SeizeRequest) -> Result<SeizeOutcome, Self::Error> {
        match self.answer(Call::Seize(request)).await {
            Step::Succeed => Ok(SeizeOutcome::success(Some("seize".to_string()))),
            Step::Reject => Ok(SeizeOutcome::failed("nothing to seize")),
            Step::Unreachable | Step::Hang => Err(Unreachable),
        }
    }
}

pub fn config(batch_threshold: u64, batch_limit: u64, max_failures: u32) -> GateConfig {
    GateConfig::builder()
        .batch_threshold(batch_threshold)
        .batch_limit(batch_limit)
        .max_failures(max_failures)
        .payment_timeout(Duration::from_secs(5))
        .build()
}

/// Wait until no payment call holds the wallet's swap lock.
pub async fn settle(store: &SessionStore, wallet: &WalletKey) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while store.is_swap_locked(wallet) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("swap lock was never released");
}
