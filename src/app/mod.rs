use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

include!("types.rs");
include!("random.rs");
include!("frontier.rs");
include!("extract.rs");
include!("behavior.rs");
include!("pool.rs");
include!("webdriver.rs");
include!("session.rs");
include!("engine.rs");
include!("data_io.rs");
include!("runtime.rs");

#[cfg(test)]
mod testing {
    use super::*;

    include!("testing.rs");
}
