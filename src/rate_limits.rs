//! Fixed window rate limiting for chat messages
//!
//! At most `limit` messages are sent per window. The window starts when the limiter is created
//! and is rebased lazily: the first check after more than `window` has passed starts a new
//! window at that moment. Messages over the limit are queued and only leave the queue through
//! [`drain`](self::RateLimiter::drain), never through [`try_send`](self::RateLimiter::try_send).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Rate limiter settings. Twitch allows 20 messages per 30 seconds for regular users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Messages per window
    pub limit: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfig {
            limit: 20,
            window: Duration::from_secs(30),
        }
    }
}

/// A chat message waiting for the next window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Normalized channel name
    pub channel: String,
    /// Message text
    pub text: String,
}

/// Outcome of [`RateLimiter::try_send`](self::RateLimiter::try_send)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Counted against the window, send it now
    Send,
    /// Over the limit, the message was queued
    Queued,
}

/// Fixed window rate limiter with a FIFO overflow queue
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    window_start: Instant,
    sent_count: u32,
    queue: VecDeque<QueuedMessage>,
}

impl RateLimiter {
    /// New limiter whose first window starts at `now`
    pub fn new(config: &RateLimiterConfig, now: Instant) -> Self {
        RateLimiter {
            limit: config.limit,
            window: config.window,
            window_start: now,
            sent_count: 0,
            queue: VecDeque::new(),
        }
    }

    fn rebase(&mut self, now: Instant) {
        if now.saturating_duration_since(self.window_start) > self.window {
            self.window_start = now;
            self.sent_count = 0;
        }
    }

    /// Admit a message if the current window has capacity, queue it otherwise
    pub fn try_send(&mut self, now: Instant, channel: &str, text: &str) -> Admission {
        self.rebase(now);
        if self.sent_count < self.limit {
            self.sent_count += 1;
            Admission::Send
        } else {
            self.queue.push_back(QueuedMessage {
                channel: channel.to_string(),
                text: text.to_string(),
            });
            Admission::Queued
        }
    }

    /// Take queued messages, oldest first, up to the capacity left in the current window
    pub fn drain(&mut self, now: Instant) -> Vec<QueuedMessage> {
        self.rebase(now);
        let mut drained = Vec::new();
        while self.sent_count < self.limit {
            match self.queue.pop_front() {
                Some(msg) => {
                    self.sent_count += 1;
                    drained.push(msg);
                }
                None => break,
            }
        }
        drained
    }

    /// Drop queued messages for a channel, returns how many were dropped
    pub fn discard_channel(&mut self, channel: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|msg| msg.channel != channel);
        before - self.queue.len()
    }

    /// Drop every queued message, returns how many were dropped
    pub fn clear_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// First instant at which the current window counts as expired, `None` if that instant is
    /// not representable
    pub fn next_reset(&self) -> Option<Instant> {
        self.window_start
            .checked_add(self.window)?
            .checked_add(Duration::from_millis(1))
    }

    /// Messages counted in the current window
    pub fn sent_in_window(&self) -> u32 {
        self.sent_count
    }

    /// Messages waiting in the queue
    pub fn queued(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.queue.iter()
    }

    /// Number of messages waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}
