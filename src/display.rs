// The UI-owned cache of what the overlay currently shows.
//
// Rectangles and labels arrive from two different pipelines at different rates
// and are merged only here, at render time, by tracking identity. This state is
// never shared across threads: the UI context owns it and applies every update
// itself, so it needs no lock.

use crate::classification::LabelMap;
use crate::core_modules::frame::{FaceBounds, FaceKey, FrameGeometry, LensFacing, RectF};
use crate::core_modules::geometry::calculate_text_rotation;

/// One face as the renderer should draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem<'a> {
    pub tracking_id: FaceKey,
    /// Outline to draw, in overlay coordinates.
    pub rect: RectF,
    /// Label text, if the classifier has produced one for this identity.
    pub label: Option<&'a str>,
    /// Where the label text is centred.
    pub label_anchor: (f32, f32),
    /// Angle in degrees at which the label text is drawn.
    pub text_rotation: f32,
}

#[derive(Debug, Default)]
pub struct DisplayState {
    faces: Vec<FaceBounds>,
    labels: LabelMap,
    geometry: Option<FrameGeometry>,
    text_rotation: f32,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in the rectangles of the latest detection cycle.
    pub fn replace_faces(&mut self, faces: Vec<FaceBounds>) {
        self.faces = faces;
    }

    /// Swaps in the labels of the latest classification run. Identities missing
    /// from `labels` lose their text.
    pub fn replace_labels(&mut self, labels: LabelMap) {
        self.labels = labels;
    }

    /// Records a new frame orientation and recomputes the label angle.
    pub fn apply_rotation(&mut self, geometry: FrameGeometry) {
        self.text_rotation =
            calculate_text_rotation(geometry.rotation, geometry.lens == LensFacing::Front);
        self.geometry = Some(geometry);
    }

    pub fn faces(&self) -> &[FaceBounds] {
        &self.faces
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    pub fn text_rotation(&self) -> f32 {
        self.text_rotation
    }

    /// Rectangles in detection order, each paired with its label.
    pub fn render_items(&self) -> Vec<OverlayItem<'_>> {
        self.faces
            .iter()
            .map(|face| OverlayItem {
                tracking_id: face.tracking_id,
                rect: face.rect,
                label: self.labels.get(&face.tracking_id).map(String::as_str),
                label_anchor: face.rect.center(),
                text_rotation: self.text_rotation,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.faces.clear();
        self.labels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::Rotation;

    fn bounds(id: Option<i32>, left: f32) -> FaceBounds {
        FaceBounds {
            tracking_id: id,
            rect: RectF::new(left, 0.0, left + 10.0, 10.0),
        }
    }

    #[test]
    fn labels_attach_by_identity() {
        let mut display = DisplayState::new();
        display.replace_faces(vec![bounds(Some(1), 0.0), bounds(Some(2), 50.0)]);
        display.replace_labels(LabelMap::from([(Some(2), "Sad".to_string())]));

        let items = display.render_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, None);
        assert_eq!(items[1].label, Some("Sad"));
        assert_eq!(items[1].label_anchor, (55.0, 5.0));
    }

    #[test]
    fn updates_replace_wholesale() {
        let mut display = DisplayState::new();
        display.replace_faces(vec![bounds(Some(1), 0.0), bounds(Some(2), 50.0)]);
        display.replace_faces(vec![bounds(Some(3), 20.0)]);
        assert_eq!(display.faces().len(), 1);
        assert_eq!(display.faces()[0].tracking_id, Some(3));

        display.replace_labels(LabelMap::from([(Some(1), "Happy".to_string())]));
        display.replace_labels(LabelMap::from([(Some(3), "Fear".to_string())]));
        assert_eq!(display.labels().len(), 1);
        assert_eq!(display.render_items()[0].label, Some("Fear"));
    }

    #[test]
    fn stale_label_stays_attached_to_reused_identity() {
        let mut display = DisplayState::new();
        display.replace_labels(LabelMap::from([(Some(4), "Happy".to_string())]));
        display.replace_faces(vec![bounds(Some(4), 100.0)]);
        assert_eq!(display.render_items()[0].label, Some("Happy"));
    }

    #[test]
    fn rotation_sets_text_angle() {
        let mut display = DisplayState::new();
        display.apply_rotation(FrameGeometry {
            width: 640,
            height: 480,
            rotation: Rotation::Deg0,
            lens: LensFacing::Front,
        });
        assert_eq!(display.text_rotation(), 270.0);
        assert_eq!(display.geometry().map(|g| g.rotation), Some(Rotation::Deg0));
    }
}
