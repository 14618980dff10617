use std::io;
use std::process;

use log::{error, info};

use publisher::amqp::AmqpClient;
use publisher::config::{init, Env};
use publisher::publish::{report, run_and_report, PublishPlan};


#[tokio::main]
async fn main() {
    // 1. Load .env vars and init logger
    let env: Env = match init() {
        Ok(env) => env,
        Err(err) => {
            report(&mut io::stdout(), &err);
            process::exit(err.exit_code());
        }
    };

    // 2. Build what has to be declared and sent
    let plan = match PublishPlan::new(&env) {
        Ok(plan) => plan,
        Err(err) => {
            error!(target: "app", "Cannot build publish plan. Err = {:?}", err);
            report(&mut io::stdout(), &err);
            process::exit(err.exit_code());
        }
    };

    // 3. Connect, declare, bind and publish
    info!(target: "app", "Publishing {} messages to exchange '{}'", plan.messages.len(), plan.exchange.name);
    let mut amqp_client = AmqpClient::new(env.amqp_uri(), env.broker_address());
    let exit_code = run_and_report(&mut amqp_client, &plan, &mut io::stdout(), env.strict_exit_code).await;

    info!(target: "app", "Exiting with code {}", exit_code);
    process::exit(exit_code);
}
