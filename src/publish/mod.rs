use std::io::Write;
use std::time::Duration;

use log::{error, info};

use crate::amqp::Broker;
use crate::config::Env;
use crate::errors::publisher_error::PublisherError;
use crate::models::exchange::{ExchangeDefinition, ExchangeKind};
use crate::models::queue::{QueueBinding, QueueDefinition};
use crate::models::SAMPLE_MESSAGES;

/// Everything a run declares and sends, in the order it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub exchange: ExchangeDefinition,
    pub queue: QueueDefinition,
    pub binding: QueueBinding,
    pub messages: Vec<String>,
    /// Pause after every publish.
    pub delay: Duration,
}

impl PublishPlan {
    pub fn new(env: &Env) -> Result<Self, PublisherError> {
        let message_ttl = i32::try_from(env.amqp_message_ttl_ms).map_err(|_| {
            PublisherError::Config(format!(
                "amqp_message_ttl_ms {} does not fit a signed 32-bit integer",
                env.amqp_message_ttl_ms
            ))
        })?;
        Ok(Self {
            exchange: ExchangeDefinition::new(&env.amqp_exchange_name, ExchangeKind::new(&env.amqp_exchange_type)),
            queue: QueueDefinition::new(&env.amqp_queue_name, message_ttl),
            binding: QueueBinding::new(&env.amqp_queue_name, &env.amqp_exchange_name, &env.amqp_routing_key),
            messages: SAMPLE_MESSAGES.iter().map(|s| s.to_string()).collect(),
            delay: Duration::from_millis(env.publish_delay_ms),
        })
    }
}

/// Runs the whole sequence against `broker`, writing one line per milestone to `out`.
///
/// The first failure stops the sequence. Nothing declared before it is undone and the
/// connection is left as it is.
pub async fn run<B, W>(broker: &mut B, plan: &PublishPlan, out: &mut W) -> Result<(), PublisherError>
where
    B: Broker + Send,
    W: Write,
{
    broker.connect().await?;

    broker.declare_exchange(&plan.exchange).await?;
    milestone(out, &format!("Exchange '{}' declared successfully.", plan.exchange.name))?;

    broker.declare_queue(&plan.queue).await?;
    milestone(out, &format!("Queue '{}' declared successfully.", plan.queue.name))?;

    broker.bind_queue(&plan.binding).await?;
    milestone(
        out,
        &format!("Queue '{}' bound to exchange '{}'.", plan.binding.queue, plan.binding.exchange),
    )?;

    for message in plan.messages.iter() {
        broker
            .publish(&plan.exchange.name, &plan.binding.routing_key, message.as_bytes())
            .await?;
        milestone(out, &format!("Sent: {}", message))?;
        tokio::time::sleep(plan.delay).await;
    }

    broker.close().await?;
    milestone(out, "All messages sent. Connection closed.")?;
    Ok(())
}

/// Runs the sequence and reports a failure as a single `ERROR:` line.
///
/// Returns the process exit code: `0` unless `strict_exit_code` is set and the run failed.
pub async fn run_and_report<B, W>(broker: &mut B, plan: &PublishPlan, out: &mut W, strict_exit_code: bool) -> i32
where
    B: Broker + Send,
    W: Write,
{
    match run(broker, plan, out).await {
        Ok(()) => {
            info!(target: "app", "run_and_report - all {} messages published", plan.messages.len());
            0
        }
        Err(err) => {
            error!(target: "app", "run_and_report - publish sequence aborted. Err = {:?}", err);
            report(out, &err);
            if strict_exit_code {
                err.exit_code()
            } else {
                0
            }
        }
    }
}

pub fn report<W: Write>(out: &mut W, err: &PublisherError) {
    if let Err(write_err) = writeln!(out, "ERROR: {}", err).and_then(|_| out.flush()) {
        error!(target: "app", "report - cannot print error line. Err = {:?}", write_err);
    }
}

fn milestone<W: Write>(out: &mut W, line: &str) -> Result<(), PublisherError> {
    info!(target: "app", "{}", line);
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use crate::config::Env;
    use crate::errors::publisher_error::PublisherError;
    use crate::models::exchange::ExchangeKind;
    use crate::publish::{run, run_and_report, PublishPlan};
    use crate::tests::amqp_stub::{AmqpStub, Step};

    fn default_env() -> Env {
        Env::from_vars(Vec::<(String, String)>::new()).unwrap()
    }

    fn default_plan() -> PublishPlan {
        PublishPlan::new(&default_env()).unwrap()
    }

    fn lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn default_plan_matches_the_fixed_script() {
        let plan = default_plan();
        assert_eq!(plan.exchange.name, "test_exchange");
        assert_eq!(plan.exchange.kind, ExchangeKind::Direct);
        assert!(plan.exchange.durable);
        assert_eq!(plan.queue.name, "test_queue");
        assert!(plan.queue.durable);
        assert_eq!(plan.queue.message_ttl, 3_600_000);
        assert_eq!(plan.binding.queue, "test_queue");
        assert_eq!(plan.binding.exchange, "test_exchange");
        assert_eq!(plan.binding.routing_key, "");
        assert_eq!(plan.messages, vec!["uno", "dos", "tres", "It just works"]);
        assert_eq!(plan.delay, Duration::from_secs(1));
    }

    #[test]
    fn ttl_too_large_is_rejected() {
        let mut env = default_env();
        env.amqp_message_ttl_ms = u64::from(u32::MAX);
        assert!(matches!(PublishPlan::new(&env), Err(PublisherError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_prints_every_milestone() {
        let plan = default_plan();
        let mut broker = AmqpStub::new();
        let mut out: Vec<u8> = Vec::new();

        run(&mut broker, &plan, &mut out).await.unwrap();

        assert_eq!(
            lines(&out),
            vec![
                "Exchange 'test_exchange' declared successfully.",
                "Queue 'test_queue' declared successfully.",
                "Queue 'test_queue' bound to exchange 'test_exchange'.",
                "Sent: uno",
                "Sent: dos",
                "Sent: tres",
                "Sent: It just works",
                "All messages sent. Connection closed.",
            ]
        );
        assert_eq!(
            broker.calls,
            vec![
                "connect",
                "declare_exchange test_exchange direct durable=true",
                "declare_queue test_queue durable=true ttl=3600000",
                "bind_queue test_queue test_exchange ''",
                "publish test_exchange '' uno",
                "publish test_exchange '' dos",
                "publish test_exchange '' tres",
                "publish test_exchange '' It just works",
                "close",
            ]
        );
        assert_eq!(broker.published(), vec!["uno", "dos", "tres", "It just works"]);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_loop_pauses_after_each_message() {
        let plan = default_plan();
        let mut broker = AmqpStub::new();
        let mut out: Vec<u8> = Vec::new();

        let started = Instant::now();
        run(&mut broker, &plan, &mut out).await.unwrap();
        let elapsed = started.elapsed();

        // three pauses between the four sends, plus the one after the last send
        assert!(elapsed >= Duration::from_secs(4));
        assert_eq!(broker.publish_times.len(), 4);
        for pair in broker.publish_times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_prints_only_the_error() {
        let plan = default_plan();
        let mut broker = AmqpStub::failing_at(Step::Connect);
        let mut out: Vec<u8> = Vec::new();

        let code = run_and_report(&mut broker, &plan, &mut out, false).await;

        assert_eq!(code, 0);
        let printed = lines(&out);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].starts_with("ERROR: cannot connect to amqp broker at localhost:5672"));
        assert!(broker.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn conflicting_exchange_stops_before_the_queue() {
        let plan = default_plan();
        let mut broker = AmqpStub::failing_at(Step::DeclareExchange);
        let mut out: Vec<u8> = Vec::new();

        let code = run_and_report(&mut broker, &plan, &mut out, false).await;

        assert_eq!(code, 0);
        let printed = lines(&out);
        assert_eq!(printed.len(), 1);
        assert!(printed[0].starts_with("ERROR: exchange 'test_exchange' already exists with different properties"));
        assert_eq!(broker.calls, vec!["connect", "declare_exchange test_exchange direct durable=true"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_mid_loop_keeps_earlier_lines() {
        let plan = default_plan();
        let mut broker = AmqpStub::failing_at(Step::Publish(2));
        let mut out: Vec<u8> = Vec::new();

        let code = run_and_report(&mut broker, &plan, &mut out, true).await;

        assert_eq!(code, 5);
        let printed = lines(&out);
        assert_eq!(
            printed[..5].to_vec(),
            vec![
                "Exchange 'test_exchange' declared successfully.",
                "Queue 'test_queue' declared successfully.",
                "Queue 'test_queue' bound to exchange 'test_exchange'.",
                "Sent: uno",
                "Sent: dos",
            ]
        );
        assert_eq!(printed.len(), 6);
        assert!(printed[5].starts_with("ERROR: amqp i/o error while trying to publish"));
        assert_eq!(broker.published(), vec!["uno", "dos"]);
        assert!(!broker.calls.contains(&"close".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mode_maps_error_kinds_to_exit_codes() {
        let plan = default_plan();
        let cases = [
            (Step::Connect, 2),
            (Step::DeclareExchange, 3),
            (Step::DeclareQueue, 3),
            (Step::BindQueue, 4),
            (Step::Publish(0), 5),
            (Step::Close, 4),
        ];
        for (step, expected) in cases {
            let mut broker = AmqpStub::failing_at(step.clone());
            let mut out: Vec<u8> = Vec::new();
            let code = run_and_report(&mut broker, &plan, &mut out, true).await;
            assert_eq!(code, expected, "step {:?}", step);
            let errors = lines(&out).iter().filter(|l| l.starts_with("ERROR: ")).count();
            assert_eq!(errors, 1, "step {:?}", step);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn custom_routing_key_is_used_for_binding_and_publishing() {
        let mut env = default_env();
        env.amqp_routing_key = "greetings".to_string();
        env.publish_delay_ms = 0;
        let plan = PublishPlan::new(&env).unwrap();
        let mut broker = AmqpStub::new();
        let mut out: Vec<u8> = Vec::new();

        run(&mut broker, &plan, &mut out).await.unwrap();

        assert!(broker.calls.contains(&"bind_queue test_queue test_exchange 'greetings'".to_string()));
        assert!(broker.calls.contains(&"publish test_exchange 'greetings' uno".to_string()));
    }
}
