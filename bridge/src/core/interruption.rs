//! Caller barge-in detection
//!
//! An interruption is the caller starting to speak while the agent is talking.
//! Detection is edge-triggered on the VAD's `speech_started` flag and debounced
//! by a cooldown measured from the last interruption that fired.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::vad::VADResult;

/// Suppressed events logged at debug level before going quiet
const MAX_LOGGED_SUPPRESSIONS: u64 = 5;

/// Interruption detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterruptionConfig {
    pub enabled: bool,
    /// Minimum time between two interruptions (ms)
    pub cooldown_ms: u64,
    /// Send a data message to the agent when an interruption fires
    pub signal_agent: bool,
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: 500,
            signal_agent: true,
        }
    }
}

/// Interruption counters
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct InterruptionStats {
    pub enabled: bool,
    pub interruption_count: u64,
    pub total_checks: u64,
    pub false_positives_prevented: u64,
    pub cooldown_ms: u64,
}

impl std::fmt::Display for InterruptionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Interruptions: {} fired, {} suppressed by cooldown, {} checks",
            self.interruption_count, self.false_positives_prevented, self.total_checks
        )
    }
}

pub struct InterruptionDetector {
    config: InterruptionConfig,
    cooldown: Duration,
    last_interruption: Option<Instant>,
    interruption_count: u64,
    total_checks: u64,
    false_positives_prevented: u64,
}

impl InterruptionDetector {
    pub fn new(config: InterruptionConfig) -> Self {
        Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            config,
            last_interruption: None,
            interruption_count: 0,
            total_checks: 0,
            false_positives_prevented: 0,
        }
    }

    /// Decide whether `vad` is an interruption of the agent at time `now`
    pub fn check_interruption(&mut self, vad: &VADResult, agent_is_speaking: bool, now: Instant) -> bool {
        self.total_checks += 1;

        if !self.config.enabled || !vad.enabled || !agent_is_speaking || !vad.speech_started {
            return false;
        }

        if let Some(last) = self.last_interruption {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                self.false_positives_prevented += 1;
                if self.false_positives_prevented <= MAX_LOGGED_SUPPRESSIONS {
                    debug!(
                        "Interruption suppressed by cooldown ({}ms < {}ms)",
                        elapsed.as_millis(),
                        self.cooldown.as_millis()
                    );
                }
                return false;
            }
        }

        self.last_interruption = Some(now);
        self.interruption_count += 1;
        info!(
            "User interruption #{} detected (confidence {:.2})",
            self.interruption_count, vad.confidence
        );
        true
    }

    pub fn interruption_count(&self) -> u64 {
        self.interruption_count
    }

    pub fn signals_agent(&self) -> bool {
        self.config.signal_agent
    }

    pub fn stats(&self) -> InterruptionStats {
        InterruptionStats {
            enabled: self.config.enabled,
            interruption_count: self.interruption_count,
            total_checks: self.total_checks,
            false_positives_prevented: self.false_positives_prevented,
            cooldown_ms: self.config.cooldown_ms,
        }
    }

    pub fn reset(&mut self) {
        self.last_interruption = None;
        self.interruption_count = 0;
        self.total_checks = 0;
        self.false_positives_prevented = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> VADResult {
        VADResult {
            enabled: true,
            is_speech: true,
            confidence: 0.9,
            speech_started: true,
            speech_ended: false,
            user_speaking: true,
        }
    }

    #[test]
    fn test_fires_on_speech_start_while_agent_speaks() {
        let mut detector = InterruptionDetector::new(InterruptionConfig::default());
        assert!(detector.check_interruption(&started(), true, Instant::now()));
        assert_eq!(detector.interruption_count(), 1);
    }

    #[test]
    fn test_requires_every_condition() {
        let mut detector = InterruptionDetector::new(InterruptionConfig::default());
        let now = Instant::now();

        assert!(!detector.check_interruption(&started(), false, now));

        let continuing = VADResult {
            speech_started: false,
            ..started()
        };
        assert!(!detector.check_interruption(&continuing, true, now));

        let vad_off = VADResult {
            enabled: false,
            ..started()
        };
        assert!(!detector.check_interruption(&vad_off, true, now));

        let mut disabled = InterruptionDetector::new(InterruptionConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!disabled.check_interruption(&started(), true, now));

        assert_eq!(detector.stats().total_checks, 3);
        assert_eq!(detector.interruption_count(), 0);
    }

    #[test]
    fn test_cooldown_suppresses_then_refires() {
        let mut detector = InterruptionDetector::new(InterruptionConfig::default());
        let t0 = Instant::now();

        assert!(detector.check_interruption(&started(), true, t0));
        assert!(!detector.check_interruption(&started(), true, t0 + Duration::from_millis(200)));
        assert!(!detector.check_interruption(&started(), true, t0 + Duration::from_millis(499)));
        assert!(detector.check_interruption(&started(), true, t0 + Duration::from_millis(600)));

        let stats = detector.stats();
        assert_eq!(stats.interruption_count, 2);
        assert_eq!(stats.false_positives_prevented, 2);
        assert_eq!(stats.total_checks, 4);
    }

    #[test]
    fn test_cooldown_measured_from_last_fired() {
        let mut detector = InterruptionDetector::new(InterruptionConfig::default());
        let t0 = Instant::now();
        assert!(detector.check_interruption(&started(), true, t0));
        // Suppressed attempts do not extend the cooldown
        assert!(!detector.check_interruption(&started(), true, t0 + Duration::from_millis(400)));
        assert!(detector.check_interruption(&started(), true, t0 + Duration::from_millis(500)));
    }

    #[test]
    fn test_reset() {
        let mut detector = InterruptionDetector::new(InterruptionConfig::default());
        let t0 = Instant::now();
        detector.check_interruption(&started(), true, t0);
        detector.reset();
        assert_eq!(detector.stats(), InterruptionStats {
            enabled: true,
            cooldown_ms: 500,
            ..Default::default()
        });
        assert!(detector.check_interruption(&started(), true, t0));
    }
}
