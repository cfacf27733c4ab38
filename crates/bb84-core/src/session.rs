//! Session state machine.
//!
//! A [`Session`] is the authoritative aggregate for one BB84 run. It owns
//! every participant's view of the run and only moves forward through
//! explicit operations:
//!
//! ```text
//! setup --transmit--> transmission --publish_bases--> sifting
//!   ^                  (report_measurements)              |
//!   |                                              check_error_rate
//!   |                                                     v
//!   +------ restart (any phase) ------ complete <-- error_check
//!                                        finalize_key
//! ```
//!
//! Each operation checks its source phase first and leaves the session
//! untouched when refused. Nothing advances on a timer.
//!
//! The session is an owned value. Callers that share it between connections
//! wrap it in their own lock; every operation takes `&mut self` and runs to
//! completion.

use bb84_proto::{Bit, Phase, PhotonPacket, QuantumBit, Role, SessionId, SessionSnapshot};

use crate::{
    channel::{self, Interception},
    env::Environment,
    error::SessionError,
    sifting::{self, SiftResult},
};

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// QBER at or above which the key must be discarded.
    pub threshold: f64,
    /// Refuse `finalize_key` when the threshold is reached. When false the
    /// threshold is advisory and only logged.
    pub enforce_threshold: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { threshold: bb84_proto::DEFAULT_QBER_THRESHOLD, enforce_threshold: true }
    }
}

/// What a transmission did to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitOutcome {
    /// Packets as they reach the receiver
    pub delivered: Vec<PhotonPacket>,
    /// Number of packets Eve intercepted (0 when inactive)
    pub intercepted: usize,
}

/// The authoritative BB84 session.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionSnapshot,
    /// Packets in flight to the receiver, after any interception.
    in_flight: Vec<PhotonPacket>,
    config: SessionConfig,
}

impl Session {
    /// Fresh session in `setup` with a new id.
    pub fn new(env: &impl Environment, config: SessionConfig) -> Self {
        let id = SessionId::from_random_bytes(env.random_id_bytes());
        tracing::info!(session_id = %id, "session created");

        Self { state: SessionSnapshot::new(id, config.threshold), in_flight: Vec::new(), config }
    }

    /// Current session id.
    pub fn id(&self) -> SessionId {
        self.state.id
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Borrow the authoritative state.
    pub fn state(&self) -> &SessionSnapshot {
        &self.state
    }

    /// Owned copy of the state for publishing.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.clone()
    }

    fn require_phase(&self, action: &'static str, expected: Phase) -> Result<(), SessionError> {
        if self.state.phase == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase { action, expected, actual: self.state.phase })
        }
    }

    fn advance(&mut self, to: Phase) {
        tracing::info!(
            session_id = %self.state.id,
            from = %self.state.phase,
            to = %to,
            "phase transition"
        );
        self.state.phase = to;
    }

    /// Alice sends her photons.
    ///
    /// When Eve is active the batch is intercepted before delivery and her
    /// log replaces any previous one.
    pub fn transmit(
        &mut self,
        env: &impl Environment,
        photons: Vec<PhotonPacket>,
    ) -> Result<TransmitOutcome, SessionError> {
        self.require_phase("transmit", Phase::Setup)?;
        if photons.is_empty() {
            return Err(SessionError::EmptyTransmission);
        }

        let (delivered, intercepted) = if self.state.eve.active {
            let Interception { delivered, log } = channel::intercept(env, &photons);
            let count = log.len();
            self.state.eve.intercepted_photons = log;
            (delivered, count)
        } else {
            (photons.clone(), 0)
        };

        tracing::info!(photons = photons.len(), intercepted, "photons transmitted");

        self.state.alice.sent_photons = photons;
        self.in_flight = delivered.clone();
        self.advance(Phase::Transmission);

        Ok(TransmitOutcome { delivered, intercepted })
    }

    /// Bob reports what he measured.
    ///
    /// Records the measured bits and the packets he received. The phase does
    /// not change.
    pub fn report_measurements(&mut self, bits: Vec<QuantumBit>) -> Result<(), SessionError> {
        self.require_phase("report_measurements", Phase::Transmission)?;

        if bits.len() != self.in_flight.len() {
            tracing::warn!(
                measured = bits.len(),
                delivered = self.in_flight.len(),
                "measurement count differs from delivered photons"
            );
        }

        tracing::info!(measurements = bits.len(), "measurements reported");
        self.state.bob.bits = bits;
        self.state.bob.received_photons = self.in_flight.clone();
        Ok(())
    }

    /// Alice publishes her bits and bases; both keys are sifted.
    pub fn publish_bases(&mut self, bits: Vec<QuantumBit>) -> Result<SiftResult, SessionError> {
        self.require_phase("publish_bases", Phase::Transmission)?;
        if self.state.bob.bits.is_empty() {
            return Err(SessionError::MeasurementsMissing);
        }

        self.state.alice.bits = bits;
        let result = sifting::sift(&self.state.alice.bits, &self.state.bob.bits);

        tracing::info!(raw = self.state.alice.bits.len(), sifted = result.len(), "keys sifted");

        self.state.alice.sifted_key.clone_from(&result.alice_key);
        self.state.bob.sifted_key.clone_from(&result.bob_key);
        self.advance(Phase::Sifting);

        Ok(result)
    }

    /// Compute and store the QBER over the sifted keys.
    pub fn check_error_rate(&mut self) -> Result<f64, SessionError> {
        self.require_phase("check_error_rate", Phase::Sifting)?;

        let qber = sifting::qber(&self.state.alice.sifted_key, &self.state.bob.sifted_key);
        tracing::info!("QBER calculated: {:.2}%", qber * 100.0);

        self.state.qber = qber;
        self.advance(Phase::ErrorCheck);
        Ok(qber)
    }

    /// Promote the sifted keys to final keys.
    ///
    /// Refused with [`SessionError::ThresholdExceeded`] when the QBER has
    /// reached the threshold and enforcement is on. Returns the key length.
    pub fn finalize_key(&mut self) -> Result<usize, SessionError> {
        self.require_phase("finalize_key", Phase::ErrorCheck)?;

        let (qber, threshold) = (self.state.qber, self.state.threshold);
        if qber >= threshold {
            if self.config.enforce_threshold {
                tracing::warn!(qber, threshold, "final key refused, possible eavesdropping");
                return Err(SessionError::ThresholdExceeded { qber, threshold });
            }
            tracing::warn!(qber, threshold, "QBER above threshold, finalizing anyway");
        }

        self.state.alice.final_key.clone_from(&self.state.alice.sifted_key);
        self.state.bob.final_key.clone_from(&self.state.bob.sifted_key);
        self.advance(Phase::Complete);

        let len = self.state.alice.final_key.len();
        tracing::info!(bits = len, "final key generated");
        Ok(len)
    }

    /// Toggle Eve. Only affects transmissions made afterwards.
    pub fn set_eavesdropping(&mut self, active: bool) {
        tracing::info!(active, "eavesdropping toggled");
        self.state.eve.active = active;
    }

    /// Replace the whole session with a fresh one (new id, cleared state).
    pub fn restart(&mut self, env: &impl Environment) {
        let previous = self.state.id;
        *self = Self::new(env, self.config);
        tracing::info!(previous = %previous, session_id = %self.state.id, "session restarted");
    }

    /// Final key for one party, empty before `complete`.
    pub fn final_key(&self, party: Role) -> &[Bit] {
        match party {
            Role::Alice => &self.state.alice.final_key,
            Role::Bob => &self.state.bob.final_key,
            Role::Eve => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use bb84_proto::Basis;

    use super::*;
    use crate::test_env::SeededEnv;

    fn session(env: &SeededEnv) -> Session {
        Session::new(env, SessionConfig::default())
    }

    /// Drive a session up to `sifting` with Bob measuring in random bases.
    fn run_to_sifting(env: &SeededEnv, session: &mut Session, n: usize) -> SiftResult {
        let bits = channel::generate_bit_sequence(env, n);
        let photons = channel::encode_all(env, &bits);
        let outcome = session.transmit(env, photons).unwrap();

        let measured = outcome
            .delivered
            .iter()
            .map(|p| {
                let basis = channel::generate_basis(env);
                QuantumBit::new(channel::measure(env, p, basis).bit, basis)
            })
            .collect();
        session.report_measurements(measured).unwrap();
        session.publish_bases(bits).unwrap()
    }

    #[test]
    fn new_session_is_setup() {
        let env = SeededEnv::new(1);
        let session = session(&env);

        assert_eq!(session.phase(), Phase::Setup);
        assert!((session.state().threshold - 0.11).abs() < f64::EPSILON);
        assert!(session.final_key(Role::Alice).is_empty());
    }

    #[test]
    fn transmit_moves_to_transmission() {
        let env = SeededEnv::new(2);
        let mut session = session(&env);
        let photons = channel::encode_all(&env, &channel::generate_bit_sequence(&env, 5));

        let outcome = session.transmit(&env, photons.clone()).unwrap();

        assert_eq!(session.phase(), Phase::Transmission);
        assert_eq!(outcome.delivered, photons);
        assert_eq!(outcome.intercepted, 0);
        assert_eq!(session.state().alice.sent_photons, photons);
        assert!(session.state().eve.intercepted_photons.is_empty());
    }

    #[test]
    fn transmit_rejects_empty_batch() {
        let env = SeededEnv::new(3);
        let mut session = session(&env);
        assert_eq!(session.transmit(&env, Vec::new()), Err(SessionError::EmptyTransmission));
        assert_eq!(session.phase(), Phase::Setup);
    }

    #[test]
    fn active_eve_intercepts_before_delivery() {
        let env = SeededEnv::new(4);
        let mut session = session(&env);
        session.set_eavesdropping(true);

        let photons = channel::encode_all(&env, &channel::generate_bit_sequence(&env, 30));
        let outcome = session.transmit(&env, photons.clone()).unwrap();

        assert_eq!(outcome.intercepted, 30);
        assert_eq!(session.state().eve.intercepted_photons.len(), 30);
        // Alice's record keeps what she actually sent
        assert_eq!(session.state().alice.sent_photons, photons);
        let log = &session.state().eve.intercepted_photons;
        for (delivered, record) in outcome.delivered.iter().zip(log) {
            assert_eq!(delivered.basis, record.eve_basis);
        }
    }

    #[test]
    fn received_photons_match_sent_count() {
        let env = SeededEnv::new(5);
        let mut session = session(&env);
        run_to_sifting(&env, &mut session, 12);

        assert_eq!(
            session.state().alice.sent_photons.len(),
            session.state().bob.received_photons.len()
        );
    }

    #[test]
    fn report_measurements_keeps_phase() {
        let env = SeededEnv::new(6);
        let mut session = session(&env);
        let photons = channel::encode_all(&env, &channel::generate_bit_sequence(&env, 3));
        session.transmit(&env, photons).unwrap();

        session
            .report_measurements(vec![QuantumBit::new(Bit::One, Basis::Diagonal); 3])
            .unwrap();
        assert_eq!(session.phase(), Phase::Transmission);
        assert_eq!(session.state().bob.bits.len(), 3);
    }

    #[test]
    fn publish_before_measurements_is_refused() {
        let env = SeededEnv::new(7);
        let mut session = session(&env);
        let bits = channel::generate_bit_sequence(&env, 4);
        session.transmit(&env, channel::encode_all(&env, &bits)).unwrap();

        assert_eq!(session.publish_bases(bits), Err(SessionError::MeasurementsMissing));
        assert_eq!(session.phase(), Phase::Transmission);
    }

    #[test]
    fn sifted_keys_have_equal_length() {
        let env = SeededEnv::new(8);
        let mut session = session(&env);
        let result = run_to_sifting(&env, &mut session, 40);

        assert_eq!(session.phase(), Phase::Sifting);
        assert_eq!(session.state().alice.sifted_key.len(), session.state().bob.sifted_key.len());
        assert_eq!(session.state().alice.sifted_key, result.alice_key);
    }

    #[test]
    fn honest_run_completes_with_zero_qber() {
        let env = SeededEnv::new(9);
        let mut session = session(&env);
        let result = run_to_sifting(&env, &mut session, 64);

        let qber = session.check_error_rate().unwrap();
        assert!(qber.abs() < f64::EPSILON);
        assert_eq!(session.phase(), Phase::ErrorCheck);

        let len = session.finalize_key().unwrap();
        assert_eq!(len, result.len());
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.final_key(Role::Alice), session.final_key(Role::Bob));
        assert!(session.state().has_final_key());
    }

    #[test]
    fn threshold_gate_refuses_final_key() {
        let env = SeededEnv::new(10);
        let mut session = session(&env);
        session.set_eavesdropping(true);
        run_to_sifting(&env, &mut session, 400);

        let qber = session.check_error_rate().unwrap();
        assert!(qber >= 0.11, "intercept-resend over 400 photons should exceed threshold");

        let err = session.finalize_key().unwrap_err();
        assert!(matches!(err, SessionError::ThresholdExceeded { .. }));
        assert_eq!(session.phase(), Phase::ErrorCheck);
        assert!(session.final_key(Role::Alice).is_empty());
    }

    #[test]
    fn advisory_threshold_still_finalizes() {
        let env = SeededEnv::new(11);
        let config = SessionConfig { enforce_threshold: false, ..SessionConfig::default() };
        let mut session = Session::new(&env, config);
        session.set_eavesdropping(true);
        run_to_sifting(&env, &mut session, 400);
        session.check_error_rate().unwrap();

        assert!(session.finalize_key().is_ok());
        assert_eq!(session.phase(), Phase::Complete);
    }

    #[test]
    fn out_of_order_operations_are_refused() {
        let env = SeededEnv::new(12);
        let mut session = session(&env);

        assert!(matches!(
            session.check_error_rate(),
            Err(SessionError::InvalidPhase { expected: Phase::Sifting, actual: Phase::Setup, .. })
        ));
        assert!(matches!(session.finalize_key(), Err(SessionError::InvalidPhase { .. })));
        assert!(matches!(
            session.report_measurements(Vec::new()),
            Err(SessionError::InvalidPhase { .. })
        ));
        assert_eq!(session.phase(), Phase::Setup);
    }

    #[test]
    fn second_transmit_requires_restart() {
        let env = SeededEnv::new(13);
        let mut session = session(&env);
        let photons = channel::encode_all(&env, &channel::generate_bit_sequence(&env, 2));
        session.transmit(&env, photons.clone()).unwrap();

        assert!(matches!(session.transmit(&env, photons), Err(SessionError::InvalidPhase { .. })));
    }

    #[test]
    fn restart_mid_sifting_clears_everything() {
        let env = SeededEnv::new(14);
        let mut session = session(&env);
        session.set_eavesdropping(true);
        run_to_sifting(&env, &mut session, 20);
        let old_id = session.id();

        session.restart(&env);

        assert_ne!(session.id(), old_id);
        assert_eq!(session.phase(), Phase::Setup);
        assert!(session.state().alice.sifted_key.is_empty());
        assert!(session.state().bob.sifted_key.is_empty());
        assert!(session.state().alice.sent_photons.is_empty());
        assert!(session.state().eve.intercepted_photons.is_empty());
        assert!(!session.state().eve.active);
        assert!(session.state().qber.abs() < f64::EPSILON);
    }
}
