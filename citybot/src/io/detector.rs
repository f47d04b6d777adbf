//! Detection provider adapter and the capture-then-detect perception pass.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::detection::{Detection, Detections};
use crate::io::device::{Device, Frame};
use crate::io::process::run_command_with_timeout;

/// Turns one captured frame into labeled, scored boxes.
pub trait Detector {
    fn detect(&self, model: &str, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Runs an external command per frame.
///
/// The model id is appended as the last argument, the PNG frame is written to
/// stdin, and stdout must hold `{"predictions": [...]}`.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandDetector {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Detector for CommandDetector {
    #[instrument(skip_all, fields(model = %model, frame_bytes = frame.0.len()))]
    fn detect(&self, model: &str, frame: &Frame) -> Result<Vec<Detection>> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("detector command is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(args).arg(model);
        let out = run_command_with_timeout(cmd, Some(&frame.0), self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run detector {program}"))?;
        out.ensure_success("detector")?;
        parse_predictions(&out.stdout)
    }
}

#[derive(Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<Detection>,
}

/// Parse the detector's JSON response.
pub fn parse_predictions(bytes: &[u8]) -> Result<Vec<Detection>> {
    let response: PredictionResponse =
        serde_json::from_slice(bytes).context("parse detector response")?;
    Ok(response.predictions)
}

/// Fresh detection pass: capture the screen and run one model over it.
#[derive(Clone, Copy)]
pub struct Perception<'a> {
    device: &'a dyn Device,
    detector: &'a dyn Detector,
    model: &'a str,
}

impl<'a> Perception<'a> {
    pub fn new(device: &'a dyn Device, detector: &'a dyn Detector, model: &'a str) -> Self {
        Self {
            device,
            detector,
            model,
        }
    }

    pub fn observe(&self) -> Result<Detections> {
        let frame = self.device.capture().context("capture frame")?;
        let predictions = self
            .detector
            .detect(self.model, &frame)
            .with_context(|| format!("detect with model {}", self.model))?;
        let detections = Detections::new(predictions);
        debug!(
            model = self.model,
            total = detections.len(),
            confident = %detections.summary(),
            "detection pass"
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prediction_payload() {
        let body = br#"{"predictions":[{"class":"in_city","x":320.5,"y":40.0,"width":60,"height":20,"confidence":0.93}],"time":0.1}"#;
        let predictions = parse_predictions(body).expect("parse");
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].class, "in_city");
        assert_eq!(predictions[0].center().x, 320);
    }

    #[test]
    fn missing_predictions_field_is_empty() {
        assert!(parse_predictions(b"{}").expect("parse").is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_predictions(b"not json").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_detector_appends_model_and_reads_stdout() {
        let script = r#"printf '{"predictions":[{"class":"%s","x":1,"y":2,"width":3,"height":4,"confidence":0.9}]}' "$0""#;
        let detector = CommandDetector::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        );
        let predictions = detector
            .detect("rok_gameplay/1", &Frame(b"png".to_vec()))
            .expect("detect");
        assert_eq!(predictions[0].class, "rok_gameplay/1");
    }
}
