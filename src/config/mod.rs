use std::str::FromStr;

use dotenvy::dotenv;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use log::{info, warn, LevelFilter};
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;

use crate::errors::publisher_error::PublisherError;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {t} - {m}{n}";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Env {
    #[serde(default = "default_amqp_host")]
    pub amqp_host: String,
    #[serde(default = "default_amqp_port")]
    pub amqp_port: u16,
    #[serde(default = "default_amqp_user")]
    pub amqp_user: String,
    #[serde(default = "default_amqp_password")]
    pub amqp_password: String,
    #[serde(default = "default_amqp_vhost")]
    pub amqp_vhost: String,
    #[serde(default = "default_amqp_exchange_name")]
    pub amqp_exchange_name: String,
    #[serde(default = "default_amqp_exchange_type")]
    pub amqp_exchange_type: String,
    #[serde(default = "default_amqp_queue_name")]
    pub amqp_queue_name: String,
    #[serde(default)]
    pub amqp_routing_key: String,
    #[serde(default = "default_amqp_message_ttl_ms")]
    pub amqp_message_ttl_ms: u64,
    #[serde(default = "default_publish_delay_ms")]
    pub publish_delay_ms: u64,
    #[serde(default)]
    pub strict_exit_code: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_amqp_host() -> String {
    "localhost".to_string()
}
fn default_amqp_port() -> u16 {
    5672
}
fn default_amqp_user() -> String {
    "testuser".to_string()
}
fn default_amqp_password() -> String {
    "passwd123".to_string()
}
fn default_amqp_vhost() -> String {
    "/".to_string()
}
fn default_amqp_exchange_name() -> String {
    "test_exchange".to_string()
}
fn default_amqp_exchange_type() -> String {
    "direct".to_string()
}
fn default_amqp_queue_name() -> String {
    "test_queue".to_string()
}
fn default_amqp_message_ttl_ms() -> u64 {
    3_600_000
}
fn default_publish_delay_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Env {
    // read the process environment, after merging the optional .env file
    pub fn load() -> Result<Self, PublisherError> {
        dotenv().ok();
        envy::from_env::<Env>().map_err(|err| PublisherError::Config(err.to_string()))
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, PublisherError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Env>(vars).map_err(|err| PublisherError::Config(err.to_string()))
    }

    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.amqp_user.clone(),
                    password: self.amqp_password.clone(),
                },
                host: self.amqp_host.clone(),
                port: self.amqp_port,
            },
            vhost: self.amqp_vhost.clone(),
            ..AMQPUri::default()
        }
    }

    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.amqp_host, self.amqp_port)
    }
}

pub fn init() -> Result<Env, PublisherError> {
    let env = Env::load()?;

    // Configure logging
    if let Err(err) = init_logger(&env.log_level) {
        // a logger is already installed, e.g. by a previous init() in the same process
        warn!(target: "app", "init - logger not initialized, err = {:?}", err);
    }
    info!(target: "app", "Starting application...");

    // Print env vars
    print_env(&env);
    Ok(env)
}

// stdout carries the milestone lines, so every log record goes to stderr
pub fn init_logger(level: &str) -> Result<(), anyhow::Error> {
    let level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| anyhow::anyhow!("invalid log4rs config: {}", err))?;
    log4rs::init_config(config)?;
    Ok(())
}

pub fn print_env(env: &Env) {
    info!(target: "app", "amqp_host = {}", env.amqp_host);
    info!(target: "app", "amqp_port = {}", env.amqp_port);
    info!(target: "app", "amqp_user = {}", env.amqp_user);
    info!(target: "app", "amqp_password = {}", mask(&env.amqp_password));
    info!(target: "app", "amqp_vhost = {}", env.amqp_vhost);
    info!(target: "app", "amqp_exchange_name = {}", env.amqp_exchange_name);
    info!(target: "app", "amqp_exchange_type = {}", env.amqp_exchange_type);
    info!(target: "app", "amqp_queue_name = {}", env.amqp_queue_name);
    info!(target: "app", "amqp_routing_key = '{}'", env.amqp_routing_key);
    info!(target: "app", "amqp_message_ttl_ms = {}", env.amqp_message_ttl_ms);
    info!(target: "app", "publish_delay_ms = {}", env.publish_delay_ms);
    info!(target: "app", "strict_exit_code = {}", env.strict_exit_code);
    info!(target: "app", "log_level = {}", env.log_level);
}

fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}
