//! Engine-facing types
//!
//! Defines what comes back from a backend and the lifecycle states of the
//! engine wrapper.

use serde::Serialize;

/// One recognized text region, in the order the backend returned it.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    /// Recognized text content
    pub text: String,
    /// Recognition confidence, normalized to [0, 1]
    pub confidence: f64,
    /// 4-point polygon delimiting the region, image coordinates,
    /// clockwise from the top-left corner
    pub polygon: [[f64; 2]; 4],
}

impl Detection {
    /// Builds an axis-aligned polygon from a bounding rectangle.
    pub fn polygon_from_rect(left: f64, top: f64, width: f64, height: f64) -> [[f64; 2]; 4] {
        let (right, bottom) = (left + width, top + height);
        [[left, top], [right, top], [right, bottom], [left, bottom]]
    }
}

/// Newline-join of detection texts, preserving backend order. The aggregate
/// `text` field of a response is always reconstructable this way.
pub fn join_text(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lifecycle of the engine wrapper.
///
/// `Ready` and `Failed` are the terminal outcomes of a single initialization
/// attempt; a `Failed` engine must keep the process from serving traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(text: &str) -> Detection {
        Detection {
            text: text.to_string(),
            confidence: 0.9,
            polygon: Detection::polygon_from_rect(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn join_text_preserves_order() {
        let detections = vec![detection("first"), detection("second"), detection("third")];
        assert_eq!(join_text(&detections), "first\nsecond\nthird");
    }

    #[test]
    fn join_text_of_empty_list_is_empty() {
        assert_eq!(join_text(&[]), "");
    }

    #[test]
    fn polygon_corners_are_clockwise_from_top_left() {
        let poly = Detection::polygon_from_rect(2.0, 3.0, 10.0, 5.0);
        assert_eq!(poly, [[2.0, 3.0], [12.0, 3.0], [12.0, 8.0], [2.0, 8.0]]);
    }
}
