//! In-process voice bot speaking the same protocol as the real server
//!
//! Implements both the bootstrap and transport seams so a full run can be
//! exercised without a network. Behaviour is scripted per bot.

use async_trait::async_trait;
use serde_json::json;
use shared::{Decoded, Frame, ProcessId, RtviEnvelope, decode_frame, process_debug, rtvi};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use crate::error::{HandshakeError, OrchestratorError, OrchestratorResult};
use crate::traits::{Bootstrapper, Transport, TransportConnector, TransportOptions, WireMessage};

/// Bytes that fail to decode as a frame: field 4 claims five bytes, one follows
pub const MALFORMED_FRAME: [u8; 3] = [0x22, 0x05, 0x0a];

#[derive(Debug, Clone, Default)]
pub struct LoopbackScript {
    /// The first N bootstrap calls answer 503
    pub bootstrap_failures: u32,
    /// The first N transport opens fail
    pub transport_failures: u32,
    /// Answer client-ready with an error envelope carrying this message
    pub bot_error: Option<String>,
    /// Never answer client-ready
    pub silent: bool,
    /// Wait before answering client-ready
    pub ready_delay: Duration,
    /// Send unrelated frames before bot-ready
    pub noise_before_ready: bool,
    /// Send one malformed frame right after bot-ready
    pub malformed_after_ready: bool,
    /// Reply with a transcription every N audio frames, 0 for never
    pub transcription_every: u32,
    /// Echo each audio frame back as bot audio
    pub echo_audio: bool,
    /// Close from the bot side after N audio frames
    pub close_after_audio: Option<u32>,
}

#[derive(Default)]
struct BotLog {
    bootstrap_calls: AtomicU32,
    opens: AtomicU32,
    bootstrap_times: StdMutex<Vec<tokio::time::Instant>>,
    frames: StdMutex<Vec<Frame>>,
}

/// Scripted loopback bot; clones share the same counters
#[derive(Clone, Default)]
pub struct LoopbackBot {
    script: Arc<LoopbackScript>,
    log: Arc<BotLog>,
}

impl LoopbackBot {
    pub fn new(script: LoopbackScript) -> Self {
        Self {
            script: Arc::new(script),
            log: Arc::new(BotLog::default()),
        }
    }

    pub fn bootstrap_calls(&self) -> u32 {
        self.log.bootstrap_calls.load(Ordering::SeqCst)
    }

    /// When each bootstrap call arrived, in call order
    pub fn bootstrap_times(&self) -> Vec<tokio::time::Instant> {
        self.log
            .bootstrap_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn transports_opened(&self) -> u32 {
        self.log.opens.load(Ordering::SeqCst)
    }

    /// Every decoded frame received from clients, across all sessions
    pub fn received_frames(&self) -> Vec<Frame> {
        self.log.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Bootstrapper for LoopbackBot {
    async fn bootstrap(&self, connect_url: &str, _client_version: &str) -> Result<String, HandshakeError> {
        let call = self.log.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .bootstrap_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokio::time::Instant::now());
        if call < self.script.bootstrap_failures {
            return Err(HandshakeError::BootstrapStatus {
                status: 503,
                body: "loopback bot unavailable".to_string(),
            });
        }
        process_debug!(ProcessId::current(), "loopback bootstrap for {}", connect_url);
        Ok(format!("loopback://session/{call}"))
    }
}

#[async_trait]
impl TransportConnector for LoopbackBot {
    async fn open(&self, url: &str, _options: &TransportOptions) -> Result<Box<dyn Transport>, HandshakeError> {
        let open = self.log.opens.fetch_add(1, Ordering::SeqCst);
        if open < self.script.transport_failures {
            return Err(HandshakeError::TransportOpen {
                message: format!("loopback refused {url}"),
            });
        }

        let (to_bot, from_client) = mpsc::unbounded_channel();
        let (to_client, from_bot) = mpsc::unbounded_channel();
        tokio::spawn(bot_session(self.script.clone(), self.log.clone(), from_client, to_client));

        Ok(Box::new(LoopbackTransport {
            to_bot: StdMutex::new(Some(to_bot)),
            from_bot: Mutex::new(from_bot),
        }))
    }
}

struct LoopbackTransport {
    to_bot: StdMutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    from_bot: Mutex<mpsc::UnboundedReceiver<WireMessage>>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: WireMessage) -> OrchestratorResult<()> {
        let guard = self.to_bot.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx
                .send(message)
                .map_err(|_| OrchestratorError::stream("loopback bot closed the session")),
            None => Err(OrchestratorError::stream("loopback transport closed")),
        }
    }

    async fn recv(&self) -> Option<OrchestratorResult<WireMessage>> {
        self.from_bot.lock().await.recv().await.map(Ok)
    }

    async fn close(&self) -> OrchestratorResult<()> {
        // Dropping the sender ends the bot session, which closes our inbound side
        self.to_bot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

fn envelope_frame(message_type: &str, data: serde_json::Value) -> WireMessage {
    WireMessage::Binary(RtviEnvelope::new(message_type, data).into_frame().encode())
}

async fn bot_session(
    script: Arc<LoopbackScript>,
    log: Arc<BotLog>,
    mut from_client: mpsc::UnboundedReceiver<WireMessage>,
    to_client: mpsc::UnboundedSender<WireMessage>,
) {
    let mut audio_frames = 0u32;

    while let Some(message) = from_client.recv().await {
        let WireMessage::Binary(bytes) = message else {
            continue;
        };
        let Ok(Decoded::Frame(frame)) = decode_frame(&bytes) else {
            continue;
        };
        log.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());

        let mut replies = Vec::new();
        match &frame {
            Frame::Message(message) => {
                let Ok(envelope) = RtviEnvelope::parse(&message.data) else {
                    continue;
                };
                match envelope.message_type.as_str() {
                    rtvi::CLIENT_READY if !script.silent => {
                        if !script.ready_delay.is_zero() {
                            tokio::time::sleep(script.ready_delay).await;
                        }
                        if script.noise_before_ready {
                            replies.push(WireMessage::Binary(
                                Frame::transcription("warming up", "bot", "").encode(),
                            ));
                            replies.push(WireMessage::Text(json!({"type": "noise"}).to_string()));
                        }
                        match &script.bot_error {
                            Some(error) => replies.push(envelope_frame(rtvi::ERROR, json!({ "message": error }))),
                            None => replies.push(envelope_frame(rtvi::BOT_READY, json!({ "version": "0.4.1" }))),
                        }
                        if script.malformed_after_ready {
                            replies.push(WireMessage::Binary(MALFORMED_FRAME.to_vec()));
                        }
                    }
                    rtvi::SEND_TEXT => {
                        let content = envelope.data["content"].as_str().unwrap_or_default();
                        replies.push(WireMessage::Binary(
                            Frame::transcription(content, "bot", "").encode(),
                        ));
                    }
                    _ => {}
                }
            }
            Frame::Audio(audio) => {
                audio_frames += 1;
                if script.echo_audio {
                    replies.push(WireMessage::Binary(
                        Frame::audio(0, audio.audio.clone(), audio.sample_rate, audio.num_channels).encode(),
                    ));
                }
                if script.transcription_every > 0 && audio_frames % script.transcription_every == 0 {
                    replies.push(WireMessage::Binary(
                        Frame::transcription(format!("heard {audio_frames} frames"), "bot", "").encode(),
                    ));
                }
            }
            Frame::Text(_) | Frame::Transcription(_) => {}
        }

        for reply in replies {
            if to_client.send(reply).is_err() {
                return;
            }
        }

        if script.close_after_audio.is_some_and(|n| audio_frames >= n) {
            return;
        }
    }
}
