//! Control Lifecycle
//!
//! Sequences Select-Before-Operate and direct control for one control
//! object. A [`ControlContext`] is created on first interaction with an object
//! and dropped when the workflow that created it reaches a terminal outcome.

use std::time::{Duration, Instant};

use scout_model::{Signal, SignalValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, ControlCapability, ControlParams};

/// Control models of IEC 61850 (`ctlModel`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlModel {
    StatusOnly = 0,
    #[default]
    DirectNormal = 1,
    SboNormal = 2,
    DirectEnhanced = 3,
    SboEnhanced = 4,
}

impl ControlModel {
    /// Model from a `ctlModel` ordinal; unknown values map to DirectNormal
    pub fn from_ctl_model(value: i64) -> Self {
        match value {
            0 => Self::StatusOnly,
            2 => Self::SboNormal,
            3 => Self::DirectEnhanced,
            4 => Self::SboEnhanced,
            _ => Self::DirectNormal,
        }
    }

    /// Operate requires a prior Select
    pub fn is_sbo(&self) -> bool {
        matches!(self, Self::SboNormal | Self::SboEnhanced)
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self, Self::DirectEnhanced | Self::SboEnhanced)
    }

    pub fn allows_control(&self) -> bool {
        *self != Self::StatusOnly
    }
}

/// Where a control object is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlState {
    #[default]
    Idle,
    Selected,
    Operating,
    Done(ControlOutcome),
}

/// Terminal outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlOutcome {
    OperateSucceeded,
    OperateFailed,
    Aborted,
}

/// Requested control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlAction {
    Select,
    Operate,
    Cancel,
    /// Select → Operate for SBO models, Operate for direct models
    SendCommand,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Select => "select",
            ControlAction::Operate => "operate",
            ControlAction::Cancel => "cancel",
            ControlAction::SendCommand => "control",
        }
    }
}

/// Control failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Object {0} is status-only")]
    StatusOnly(String),

    #[error("Operate on {0} requires a prior Select")]
    NotSelected(String),

    #[error("Selection of {0} expired")]
    SelectionExpired(String),

    #[error("Select rejected: {0}")]
    SelectRejected(String),

    #[error("Control not supported by adapter")]
    Unsupported,

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

/// Defaults applied to zero-valued [`ControlParams`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDefaults {
    pub originator_category: i32,
    pub originator_identity: String,
    pub sbo_timeout: Duration,
}

impl Default for ControlDefaults {
    fn default() -> Self {
        Self {
            originator_category: 2,
            originator_identity: "ScadaScout".to_string(),
            sbo_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Control object reference behind a command signal address
///
/// `LD1/CSWI1.Pos.Oper.ctlVal` → `LD1/CSWI1.Pos`
pub fn control_object_ref(address: &str) -> &str {
    for marker in [".SBOw", ".SBO", ".Oper", ".Cancel"] {
        if let Some(pos) = address.find(marker) {
            let rest = &address[pos + marker.len()..];
            if rest.is_empty() || rest.starts_with('.') {
                return &address[..pos];
            }
        }
    }
    address.strip_suffix(".ctlVal").unwrap_or(address)
}

/// Per-object control state
#[derive(Debug, Clone)]
pub struct ControlContext {
    pub object_ref: String,
    pub model: ControlModel,
    pub state: ControlState,
    /// Sequence number of the next control request
    pub ctl_num: u8,
    pub originator_category: i32,
    pub originator_identity: String,
    pub test: bool,
    pub sbo_timeout: Duration,
    pub selected_at: Option<Instant>,
    pub last_error: Option<String>,
}

impl ControlContext {
    /// Initialize a context for the object behind `signal`
    ///
    /// The control model is resolved from the adapter when it knows it.
    pub fn resolve(
        controller: &mut dyn ControlCapability,
        signal: &Signal,
        params: &ControlParams,
        defaults: &ControlDefaults,
        ctl_num: u8,
    ) -> Self {
        let object_ref = control_object_ref(&signal.address).to_string();
        let model = controller.control_model(&object_ref).unwrap_or_default();
        debug!("Control context for {}: {:?}", object_ref, model);

        Self {
            object_ref,
            model,
            state: ControlState::Idle,
            ctl_num,
            originator_category: if params.originator_category == 0 {
                defaults.originator_category
            } else {
                params.originator_category
            },
            originator_identity: if params.originator_identity.is_empty() {
                defaults.originator_identity.clone()
            } else {
                params.originator_identity.clone()
            },
            test: params.test,
            sbo_timeout: if params.sbo_timeout_ms == 0 {
                defaults.sbo_timeout
            } else {
                Duration::from_millis(params.sbo_timeout_ms)
            },
            selected_at: None,
            last_error: None,
        }
    }

    /// Whether the context reached a terminal outcome
    pub fn is_finished(&self) -> bool {
        matches!(self.state, ControlState::Done(_))
    }

    /// Parameters forwarded to the adapter for the next request
    fn request_params(&self, base: &ControlParams) -> ControlParams {
        ControlParams {
            originator_category: self.originator_category,
            originator_identity: self.originator_identity.clone(),
            test: self.test,
            interlock_check: base.interlock_check,
            synchro_check: base.synchro_check,
            sbo_timeout_ms: self.sbo_timeout.as_millis() as u64,
            ctl_num: self.ctl_num,
        }
    }

    fn advance_ctl_num(&mut self) {
        self.ctl_num = self.ctl_num.wrapping_add(1);
    }

    fn ensure_controllable(&self) -> Result<(), ControlError> {
        if self.model.allows_control() {
            Ok(())
        } else {
            Err(ControlError::StatusOnly(self.object_ref.clone()))
        }
    }

    /// Select the object (SBO models only; direct models accept it as a no-op)
    pub fn select(
        &mut self,
        controller: &mut dyn ControlCapability,
        signal: &Signal,
        value: Option<&SignalValue>,
        params: &ControlParams,
    ) -> Result<(), ControlError> {
        self.ensure_controllable()?;
        if !self.model.is_sbo() {
            return Ok(());
        }

        let request = self.request_params(params);
        match controller.select(signal, value, &request) {
            Ok(()) => {
                info!("Selected {} (ctlNum={})", self.object_ref, self.ctl_num);
                self.state = ControlState::Selected;
                self.selected_at = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                warn!("Select {} failed: {}", self.object_ref, e);
                self.last_error = Some(e.to_string());
                self.state = ControlState::Idle;
                Err(ControlError::SelectRejected(e.to_string()))
            }
        }
    }

    /// Operate; SBO models must be selected within the SBO timeout
    pub fn operate(
        &mut self,
        controller: &mut dyn ControlCapability,
        signal: &Signal,
        value: &SignalValue,
        params: &ControlParams,
    ) -> Result<ControlOutcome, ControlError> {
        self.ensure_controllable()?;

        if self.model.is_sbo() {
            match (self.state, self.selected_at) {
                (ControlState::Selected, Some(at)) if at.elapsed() <= self.sbo_timeout => {}
                (ControlState::Selected, _) => {
                    self.state = ControlState::Idle;
                    self.selected_at = None;
                    return Err(ControlError::SelectionExpired(self.object_ref.clone()));
                }
                _ => return Err(ControlError::NotSelected(self.object_ref.clone())),
            }
        }

        self.state = ControlState::Operating;
        let request = self.request_params(params);
        let outcome = match controller.operate(signal, value, &request) {
            Ok(()) => {
                info!("Operate {} = {} succeeded", self.object_ref, value);
                ControlOutcome::OperateSucceeded
            }
            Err(e) => {
                warn!("Operate {} failed: {}", self.object_ref, e);
                self.last_error = Some(e.to_string());
                ControlOutcome::OperateFailed
            }
        };
        self.advance_ctl_num();
        self.selected_at = None;
        self.state = ControlState::Done(outcome);
        Ok(outcome)
    }

    /// Cancel a pending selection
    pub fn cancel(
        &mut self,
        controller: &mut dyn ControlCapability,
        signal: &Signal,
        params: &ControlParams,
    ) -> Result<ControlOutcome, ControlError> {
        let request = self.request_params(params);
        if let Err(e) = controller.cancel(signal, &request) {
            // The local selection is dropped regardless
            warn!("Cancel {} failed: {}", self.object_ref, e);
            self.last_error = Some(e.to_string());
        }
        self.selected_at = None;
        self.state = ControlState::Done(ControlOutcome::Aborted);
        Ok(ControlOutcome::Aborted)
    }

    /// Select then Operate for SBO models, Operate for direct models
    pub fn send_command(
        &mut self,
        controller: &mut dyn ControlCapability,
        signal: &Signal,
        value: &SignalValue,
        params: &ControlParams,
    ) -> Result<ControlOutcome, ControlError> {
        if self.model.is_sbo() && self.state != ControlState::Selected {
            self.select(controller, signal, Some(value), params)?;
        }
        self.operate(controller, signal, value, params)
    }
}
