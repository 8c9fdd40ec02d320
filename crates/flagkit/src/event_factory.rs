// SPDX-License-Identifier: MIT OR Apache-2.0
//! Turning evaluation results into analytics events.

use flagkit_core::{Context, EvaluationDetail, Flag, Value};
use flagkit_events::{now_millis, CustomEvent, EvalEvent, IdentifyEvent, InputEvent};

/// Builds input events from evaluation outcomes.
///
/// Two factories exist per client: one that attaches reasons only when the
/// flag requires them (the default path), and one that always attaches
/// them (the `*_detail` path).
#[derive(Clone, Copy, Debug)]
pub struct EventFactory {
    with_reasons: bool,
}

impl EventFactory {
    /// Reasons only when tracking demands them.
    pub fn without_reasons() -> Self {
        Self {
            with_reasons: false,
        }
    }

    /// Reasons on every event.
    pub fn with_reasons() -> Self {
        Self { with_reasons: true }
    }

    /// An event for an evaluation of a known flag.
    pub fn eval_event(
        &self,
        flag: &Flag,
        context: &Context,
        detail: &EvaluationDetail<Value>,
        default_value: Value,
        prereq_of: Option<String>,
    ) -> InputEvent {
        let experimentation = flag.is_experimentation_enabled(&detail.reason);
        InputEvent::Eval(EvalEvent {
            creation_date: now_millis(),
            flag_key: flag.key.clone(),
            version: Some(flag.version),
            context: context.clone(),
            variation: detail.variation_index,
            value: detail.value.clone(),
            default_value,
            reason: (self.with_reasons || experimentation).then(|| detail.reason.clone()),
            prereq_of,
            track_events: flag.track_events || experimentation,
            debug_events_until_date: flag.debug_events_until_date,
        })
    }

    /// An event for an evaluation that could not resolve a flag.
    pub fn unknown_flag_event(
        &self,
        flag_key: &str,
        context: &Context,
        detail: &EvaluationDetail<Value>,
        default_value: Value,
    ) -> InputEvent {
        InputEvent::Eval(EvalEvent {
            creation_date: now_millis(),
            flag_key: flag_key.to_owned(),
            version: None,
            context: context.clone(),
            variation: None,
            value: detail.value.clone(),
            default_value,
            reason: self.with_reasons.then(|| detail.reason.clone()),
            prereq_of: None,
            track_events: false,
            debug_events_until_date: None,
        })
    }

    /// An identify event.
    pub fn identify_event(&self, context: &Context) -> InputEvent {
        InputEvent::Identify(IdentifyEvent {
            creation_date: now_millis(),
            context: context.clone(),
        })
    }

    /// A custom (track) event.
    pub fn custom_event(
        &self,
        key: impl Into<String>,
        context: &Context,
        data: Option<Value>,
        metric_value: Option<f64>,
    ) -> InputEvent {
        InputEvent::Custom(CustomEvent {
            creation_date: now_millis(),
            key: key.into(),
            context: context.clone(),
            data,
            metric_value,
        })
    }
}
