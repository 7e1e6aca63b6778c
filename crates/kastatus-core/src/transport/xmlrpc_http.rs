//! XML-RPC over a persistent HTTP/1.1 connection.
//!
//! Uses `hyper`'s low-level client connection over a `tokio` TCP stream.
//! The connection driver runs as a spawned task owned by the transport and
//! is aborted when the channel is closed or the transport dropped.

use std::io;
use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::client::conn::http1::SendRequest;
use hyper::header::{CONTENT_TYPE, HOST, USER_AGENT};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Endpoint, Transport, TransportError};
use crate::BoxFuture;
use crate::build_info;
use crate::value::RpcValue;
use crate::xmlrpc::{self, MethodResponse};

/// Largest reply body accepted from a daemon.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

struct Channel {
    endpoint: Endpoint,
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

/// Production [`Transport`]: one TCP connection, many `POST`s.
pub struct XmlRpcTransport {
    channel: Option<Channel>,
    user_agent: String,
}

impl XmlRpcTransport {
    pub fn new() -> Self {
        Self {
            channel: None,
            user_agent: build_info::user_agent(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|c| !c.sender.is_closed() && !c.driver.is_finished())
    }

    async fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Channel, TransportError> {
        let authority = endpoint.authority();
        let stream = tokio::time::timeout(timeout, dial(&authority, timeout))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                endpoint: authority.clone(),
                timeout,
            })??;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Transport(format!("set_nodelay: {e}")))?;

        let handshake = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream));
        let (sender, conn) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                endpoint: authority.clone(),
                timeout,
            })?
            .map_err(|e| TransportError::Transport(format!("HTTP handshake failed: {e}")))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "XML-RPC connection closed with error");
            }
        });

        Ok(Channel {
            endpoint: endpoint.clone(),
            sender,
            driver,
        })
    }
}

impl Default for XmlRpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve `authority` and connect to the first address that accepts.
async fn dial(authority: &str, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addrs = tokio::net::lookup_host(authority)
        .await
        .map_err(|e| TransportError::AddressInvalid(format!("{authority}: {e}")))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) if e.kind() == io::ErrorKind::TimedOut => TransportError::ConnectionTimeout {
            endpoint: authority.to_string(),
            timeout,
        },
        Some(_) => TransportError::ConnectionRefused {
            endpoint: authority.to_string(),
        },
        None => TransportError::AddressInvalid(format!("{authority}: no addresses resolved")),
    })
}

impl Transport for XmlRpcTransport {
    fn connect<'a>(
        &'a mut self,
        endpoint: &'a Endpoint,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.close();
            debug!(endpoint = %endpoint, "Connecting");
            self.channel = Some(Self::open(endpoint, timeout).await?);
            Ok(())
        })
    }

    fn call<'a>(
        &'a mut self,
        method: &'a str,
        params: &'a [RpcValue],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<RpcValue, TransportError>> {
        Box::pin(async move {
            let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;

            let request = hyper::Request::post(channel.endpoint.path.as_str())
                .header(HOST, channel.endpoint.authority())
                .header(CONTENT_TYPE, "text/xml")
                .header(USER_AGENT, self.user_agent.as_str())
                .body(Full::new(Bytes::from(xmlrpc::encode_call(method, params))))
                .map_err(|e| TransportError::Transport(format!("failed to build request: {e}")))?;

            let sender = &mut channel.sender;
            let exchange = async move {
                sender
                    .ready()
                    .await
                    .map_err(|e| TransportError::Transport(format!("channel not ready: {e}")))?;
                let response = sender
                    .send_request(request)
                    .await
                    .map_err(|e| TransportError::Transport(format!("request failed: {e}")))?;
                let status = response.status();
                let body = Limited::new(response.into_body(), MAX_BODY_BYTES)
                    .collect()
                    .await
                    .map_err(|e| {
                        if e.is::<LengthLimitError>() {
                            TransportError::InvalidResponse(format!(
                                "reply body exceeds {MAX_BODY_BYTES} bytes"
                            ))
                        } else {
                            TransportError::Transport(format!("failed to read body: {e}"))
                        }
                    })?
                    .to_bytes();
                Ok::<_, TransportError>((status, body))
            };

            let (status, body) = tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| TransportError::CallTimeout(timeout))??;

            if !status.is_success() {
                warn!(method, status = status.as_u16(), "Daemon answered with HTTP error");
                return Err(TransportError::Http {
                    status: status.as_u16(),
                });
            }

            let text = std::str::from_utf8(&body)
                .map_err(|e| TransportError::InvalidResponse(format!("body is not UTF-8: {e}")))?;
            match xmlrpc::decode_response(text)
                .map_err(|e| TransportError::InvalidResponse(e.to_string()))?
            {
                MethodResponse::Success(value) => Ok(value),
                MethodResponse::Fault { code, message } => {
                    Err(TransportError::RemoteFault { code, message })
                }
            }
        })
    }

    fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            debug!(endpoint = %channel.endpoint, "Closing channel");
            channel.driver.abort();
        }
    }
}

impl Drop for XmlRpcTransport {
    fn drop(&mut self) {
        self.close();
    }
}
