//! Placed layers of a timeline and the attach/detach bookkeeping around them.

use crate::foundation::error::{VedError, VedResult};
use crate::layer::LayerRef;
use crate::timeline::TimelineId;

/// A layer placed on a timeline.
#[derive(Clone, Debug)]
pub struct Track {
    /// Placement of the layer's local time zero, in timeline seconds.
    pub offset: f64,
    duration: f64,
    pub layer: LayerRef,
}

impl Track {
    pub fn start(&self) -> f64 {
        self.offset
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Activation window `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        self.start() <= t && t < self.end()
    }
}

/// Ordered tracks of one timeline.
///
/// Every mutation goes through this type, which attaches layers on insert and deactivates and
/// detaches them on every removal path, including drop.
#[derive(Debug)]
pub struct Tracks {
    owner: TimelineId,
    items: Vec<Track>,
}

impl Tracks {
    pub(crate) fn new(owner: TimelineId) -> Self {
        Self {
            owner,
            items: Vec::new(),
        }
    }

    pub fn owner(&self) -> TimelineId {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.items.get(index)
    }

    pub fn contains(&self, layer: &LayerRef) -> bool {
        self.items.iter().any(|t| t.layer.ptr_eq(layer))
    }

    /// Append `layer` at `offset` seconds and attach it.
    pub fn push(&mut self, offset: f64, layer: impl Into<LayerRef>) -> VedResult<()> {
        let layer = layer.into();
        check_offset(offset)?;
        let duration = {
            let mut l = layer.borrow_mut()?;
            l.attach(self.owner)?;
            l.duration()
        };
        self.items.push(Track {
            offset,
            duration,
            layer,
        });
        Ok(())
    }

    /// Remove the track at `index`, detaching its layer.
    ///
    /// If the layer cannot be detached the track stays in place.
    pub fn remove(&mut self, index: usize) -> VedResult<Track> {
        let Some(track) = self.items.get(index) else {
            return Err(VedError::config(format!(
                "track index {index} out of range for {} tracks",
                self.items.len()
            )));
        };
        release(track)?;
        Ok(self.items.remove(index))
    }

    /// Remove every track holding `layer`. Returns how many were removed.
    pub fn remove_layer(&mut self, layer: &LayerRef) -> VedResult<usize> {
        let before = self.items.len();
        self.retain(|t| !t.layer.ptr_eq(layer))?;
        Ok(before - self.items.len())
    }

    /// Keep only the tracks for which `keep` returns `true`; the rest are detached.
    ///
    /// Every rejected track is attempted. Tracks whose layer cannot be detached stay in the
    /// collection and the first such error is returned.
    pub fn retain(&mut self, mut keep: impl FnMut(&Track) -> bool) -> VedResult<()> {
        let mut first_err = None;
        let mut kept = Vec::with_capacity(self.items.len());
        for track in std::mem::take(&mut self.items) {
            if keep(&track) {
                kept.push(track);
            } else if let Err(e) = release(&track) {
                kept.push(track);
                first_err.get_or_insert(e);
            }
        }
        self.items = kept;
        first_err.map_or(Ok(()), Err)
    }

    /// Replace the whole collection.
    ///
    /// Current layers are detached before the new ones are attached, so a layer present in
    /// both is detached once and re-attached once. The input is validated up front; on error
    /// the collection is left unchanged.
    pub fn replace(
        &mut self,
        tracks: impl IntoIterator<Item = (f64, LayerRef)>,
    ) -> VedResult<()> {
        let incoming: Vec<(f64, LayerRef)> = tracks.into_iter().collect();
        for (i, (offset, layer)) in incoming.iter().enumerate() {
            check_offset(*offset)?;
            if incoming[..i].iter().any(|(_, other)| other.ptr_eq(layer)) {
                return Err(VedError::config(format!(
                    "layer {:?} appears twice in replacement tracks",
                    layer.id()
                )));
            }
            let attached_elsewhere = layer
                .borrow()?
                .timeline()
                .is_some_and(|id| id != self.owner || !self.contains(layer));
            if attached_elsewhere {
                return Err(VedError::config(format!(
                    "layer {:?} is attached to another timeline",
                    layer.id()
                )));
            }
        }

        self.clear()?;
        for (offset, layer) in incoming {
            self.push(offset, layer)?;
        }
        Ok(())
    }

    /// Remove every track.
    pub fn clear(&mut self) -> VedResult<()> {
        self.retain(|_| false)
    }
}

impl<'a> IntoIterator for &'a Tracks {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Drop for Tracks {
    fn drop(&mut self) {
        for track in std::mem::take(&mut self.items) {
            if let Err(e) = release(&track) {
                tracing::warn!(layer = ?track.layer.id(), error = %e, "failed to detach layer");
            }
        }
    }
}

fn check_offset(offset: f64) -> VedResult<()> {
    if !offset.is_finite() || offset < 0.0 {
        return Err(VedError::config(format!(
            "track offset must be a non-negative number of seconds, got {offset}"
        )));
    }
    Ok(())
}

/// Close any open activation window, then detach.
fn release(track: &Track) -> VedResult<()> {
    let mut layer = track.layer.borrow_mut()?;
    layer.deactivate();
    layer.detach();
    Ok(())
}
