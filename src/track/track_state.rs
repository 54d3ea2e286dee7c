//! Per-frame observations carried by a track.

use nalgebra::Vector2;

use crate::track::FrameId;
use crate::track::rect::BoundingBox;

/// A detected image feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Image location in pixels
    pub location: Vector2<f64>,
    /// Detection scale
    pub scale: f64,
    /// Orientation in radians
    pub angle: f64,
    /// Detector response magnitude
    pub magnitude: f64,
}

impl Feature {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            location: Vector2::new(x, y),
            scale: 1.0,
            angle: 0.0,
            magnitude: 0.0,
        }
    }
}

/// Binary feature descriptor compared with the Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Descriptor {
    bytes: Vec<u8>,
}

impl Descriptor {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of differing bits. Bytes present in only one descriptor count
    /// as fully different.
    pub fn hamming_distance(&self, other: &Descriptor) -> u32 {
        let common: u32 = self
            .bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let extra = self.bytes.len().abs_diff(other.bytes.len()) as u32 * 8;
        common + extra
    }
}

/// A detected object observation.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class_name: Option<String>,
}

impl DetectedObject {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            bbox,
            confidence,
            class_name: None,
        }
    }
}

/// Payload of a track state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateData {
    /// Frame number only
    #[default]
    Plain,
    /// Image feature, optionally described
    Feature {
        feature: Feature,
        descriptor: Option<Descriptor>,
    },
    /// Detected object bounding box
    Object(DetectedObject),
}

/// One observation of a track on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackState {
    frame: FrameId,
    data: StateData,
}

impl TrackState {
    /// Create a state with no payload.
    pub fn new(frame: FrameId) -> Self {
        Self {
            frame,
            data: StateData::Plain,
        }
    }

    pub fn with_feature(frame: FrameId, feature: Feature, descriptor: Option<Descriptor>) -> Self {
        Self {
            frame,
            data: StateData::Feature {
                feature,
                descriptor,
            },
        }
    }

    pub fn with_object(frame: FrameId, object: DetectedObject) -> Self {
        Self {
            frame,
            data: StateData::Object(object),
        }
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn data(&self) -> &StateData {
        &self.data
    }

    pub fn feature(&self) -> Option<&Feature> {
        match &self.data {
            StateData::Feature { feature, .. } => Some(feature),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        match &self.data {
            StateData::Feature { descriptor, .. } => descriptor.as_ref(),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&DetectedObject> {
        match &self.data {
            StateData::Object(object) => Some(object),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_distance() {
        let a = Descriptor::new(vec![0b1010_1010, 0xff]);
        let b = Descriptor::new(vec![0b1010_1011, 0x0f]);
        assert_eq!(a.hamming_distance(&b), 1 + 4);
        assert_eq!(a.hamming_distance(&a), 0);
    }

    #[test]
    fn test_hamming_distance_length_mismatch() {
        let a = Descriptor::new(vec![0x00]);
        let b = Descriptor::new(vec![0x00, 0x00]);
        assert_eq!(a.hamming_distance(&b), 8);
    }

    #[test]
    fn test_variant_accessors() {
        let plain = TrackState::new(3);
        assert!(plain.feature().is_none());
        assert!(plain.object().is_none());

        let feat = TrackState::with_feature(4, Feature::new(1.0, 2.0), None);
        assert_eq!(feat.feature().map(|f| f.location.x), Some(1.0));
        assert!(feat.descriptor().is_none());

        let obj = TrackState::with_object(
            5,
            DetectedObject::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
        );
        assert_eq!(obj.frame(), 5);
        assert!(obj.feature().is_none());
        assert!(obj.object().is_some());
    }
}
