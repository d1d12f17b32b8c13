// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted plugin speaking the Costplane wire protocol.
//!
//! `MockPlugin` answers the identity and introspection operations itself and
//! applies its [`MockBehavior`] to every cost operation, so tests can stage
//! timeouts, crashes and error statuses without a real pricing backend.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use costplane_core::{CostValue, PluginInfo, Recommendation, StatusCode};
use costplane_host::protocol::{Method, NameReply, Request, Response, encode_line};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// How a mock plugin answers cost operations.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Reply with this monthly cost in USD.
    Cost(f64),
    /// Reply with a zero cost.
    Zero,
    /// Reply with an error status.
    Fail(StatusCode),
    /// Accept requests and never answer them.
    Hang,
    /// Close the connection on the first cost request.
    Crash,
    /// Answer nothing at all, not even the readiness probe.
    Silent,
    /// Reply with this monthly cost after a delay.
    Delay(Duration, f64),
}

impl FromStr for MockBehavior {
    type Err = String;

    /// Parse `cost:12.5`, `zero`, `fail:UNAVAILABLE`, `hang`, `crash`,
    /// `silent` or `delay:<ms>:<monthly>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let kind = parts.next().unwrap_or_default();
        let arg = parts.next();
        let number = |v: Option<&str>| -> Result<f64, String> {
            v.ok_or_else(|| format!("behavior `{s}` needs a value"))?
                .parse::<f64>()
                .map_err(|e| format!("behavior `{s}`: {e}"))
        };
        match kind {
            "cost" => Ok(MockBehavior::Cost(number(arg)?)),
            "zero" => Ok(MockBehavior::Zero),
            "fail" => {
                let code = arg.ok_or_else(|| format!("behavior `{s}` needs a status code"))?;
                Ok(MockBehavior::Fail(StatusCode::from_wire(code)))
            }
            "hang" => Ok(MockBehavior::Hang),
            "crash" => Ok(MockBehavior::Crash),
            "silent" => Ok(MockBehavior::Silent),
            "delay" => {
                let ms = number(arg)? as u64;
                Ok(MockBehavior::Delay(Duration::from_millis(ms), number(parts.next())?))
            }
            other => Err(format!("unknown mock behavior `{other}`")),
        }
    }
}

/// A plugin with a fixed identity and behavior.
///
/// Clones share the call counter, so a test can keep one handle while the
/// launcher serves another.
#[derive(Debug, Clone)]
pub struct MockPlugin {
    info: PluginInfo,
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockPlugin {
    pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            info: PluginInfo {
                name: name.into(),
                version: "1.0.0".to_string(),
                providers: Vec::new(),
                features: Default::default(),
                priority: None,
            },
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report this capability set from the introspection operation.
    pub fn with_info(mut self, info: PluginInfo) -> Self {
        self.info = info;
        self
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn behavior(&self) -> &MockBehavior {
        &self.behavior
    }

    /// Cost operations received, whether or not they were answered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Serve requests until the peer hangs up or the behavior crashes.
    pub async fn serve<R, W>(self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = rx.recv().await {
                if writer.write_all(&line).await.is_err() || writer.flush().await.is_err() {
                    return;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(request) = serde_json::from_str::<Request>(&line) else {
                tracing::warn!(plugin = %self.info.name, "mock plugin got a malformed request");
                continue;
            };
            if self.behavior == MockBehavior::Silent {
                continue;
            }
            let reply = match request.method {
                Method::Name => {
                    let name = NameReply {
                        name: self.info.name.clone(),
                    };
                    Response::ok(request.id, serde_json::to_value(name).unwrap_or_default())
                }
                Method::GetPluginInfo => {
                    Response::ok(request.id, serde_json::to_value(&self.info).unwrap_or_default())
                }
                method => {
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    match self.answer(request.id, method) {
                        Step::Reply(reply) => reply,
                        Step::Later(delay, reply) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                if let Ok(line) = encode_line(&reply) {
                                    let _ = tx.send(line);
                                }
                            });
                            continue;
                        }
                        Step::Ignore => continue,
                        Step::Hangup => break,
                    }
                }
            };
            match encode_line(&reply) {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "mock plugin failed to encode a reply"),
            }
        }

        if self.behavior == MockBehavior::Crash {
            writer_task.abort();
        } else {
            drop(tx);
            let _ = writer_task.await;
        }
    }

    fn answer(&self, id: u64, method: Method) -> Step {
        match &self.behavior {
            MockBehavior::Cost(monthly) => Step::Reply(Response::ok(id, cost_result(method, *monthly))),
            MockBehavior::Zero => Step::Reply(Response::ok(id, cost_result(method, 0.0))),
            MockBehavior::Fail(code) => Step::Reply(Response::err(
                id,
                code.to_string(),
                format!("{} refused the request", self.info.name),
            )),
            MockBehavior::Delay(delay, monthly) => {
                Step::Later(*delay, Response::ok(id, cost_result(method, *monthly)))
            }
            MockBehavior::Hang | MockBehavior::Silent => Step::Ignore,
            MockBehavior::Crash => Step::Hangup,
        }
    }
}

enum Step {
    Reply(Response),
    Later(Duration, Response),
    Ignore,
    Hangup,
}

fn cost_result(method: Method, monthly: f64) -> serde_json::Value {
    if method == Method::GetRecommendations {
        if monthly == 0.0 {
            return json!([]);
        }
        let item = Recommendation {
            id: "rightsize".to_string(),
            description: "Move to a smaller instance size".to_string(),
            estimated_savings: monthly,
            currency: "USD".to_string(),
        };
        return serde_json::to_value(vec![item]).unwrap_or_default();
    }
    serde_json::to_value(CostValue::monthly("USD", monthly)).unwrap_or_default()
}
