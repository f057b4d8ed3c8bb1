use bytes::Bytes;

use crate::error::Result;

/// A synthesized codec prefix written immediately before its access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlob {
    data: Bytes,
}

impl HeaderBlob {
    /// Wraps header bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Header bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Header length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length header.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One compressed frame on its way into the decoder.
///
/// The session keeps a single access unit and refills it per `decode` call,
/// so the payload storage is reused and the last checked-in pts survives
/// between units. A unit is *valid* from [`fill`](Self::fill) until its last
/// payload byte is accepted; validity drops exactly once.
#[derive(Debug, Default)]
pub struct AccessUnit {
    data: Vec<u8>,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    keyframe: bool,
    header: Option<HeaderBlob>,
    header_written: usize,
    pending_header: bool,
    valid: bool,
    written: usize,
    last_pts: i64,
}

impl AccessUnit {
    /// An empty, invalid unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a new payload. Timestamps are in decoder ticks; `duration` is the
    /// caller's frame duration (0 when unknown).
    pub fn fill(
        &mut self,
        payload: &[u8],
        dts: Option<i64>,
        pts: Option<i64>,
        duration: i64,
        keyframe: bool,
    ) -> Result<()> {
        self.data.clear();
        self.data.try_reserve_exact(payload.len())?;
        self.data.extend_from_slice(payload);
        self.dts = dts;
        self.pts = pts;
        self.duration = duration;
        self.keyframe = keyframe;
        self.header = None;
        self.header_written = 0;
        self.pending_header = true;
        self.valid = true;
        self.written = 0;
        Ok(())
    }

    /// Attaches a header to be written before the payload.
    pub fn attach_header(&mut self, header: HeaderBlob) {
        self.header = Some(header);
        self.header_written = 0;
        self.pending_header = true;
    }

    /// The attached header, if any.
    pub fn header(&self) -> Option<&HeaderBlob> {
        self.header.as_ref()
    }

    /// Header bytes not yet accepted by the decoder.
    pub fn header_remaining(&self) -> &[u8] {
        match &self.header {
            Some(header) => &header.as_bytes()[self.header_written.min(header.len())..],
            None => &[],
        }
    }

    pub(crate) fn advance_header(&mut self, n: usize) {
        self.header_written += n;
    }

    /// True until the unit's first submission has checked in and written its header.
    pub fn pending_header(&self) -> bool {
        self.pending_header
    }

    pub(crate) fn clear_pending_header(&mut self) {
        self.pending_header = false;
        self.header = None;
        self.header_written = 0;
    }

    /// The full payload.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Mutable payload storage, for in-place reframing.
    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Payload bytes not yet accepted by the decoder.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.written.min(self.data.len())..]
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.written += n;
    }

    /// Marks the payload fully submitted.
    pub(crate) fn mark_consumed(&mut self) {
        self.valid = false;
        self.data.clear();
        self.written = 0;
    }

    /// Drops the payload without submitting it.
    pub fn discard(&mut self) {
        self.mark_consumed();
        self.clear_pending_header();
    }

    /// Releases all storage and zeroes every field, including the last pts.
    pub fn release(&mut self) {
        *self = Self::default();
    }

    /// False once every payload byte has been written.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Presentation timestamp in decoder ticks.
    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    /// Decode timestamp in decoder ticks.
    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    /// Caller-supplied duration, 0 when unknown.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Whether the demuxer flagged this unit as a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    /// The last timestamp checked in for any unit of this session.
    pub fn last_pts(&self) -> i64 {
        self.last_pts
    }

    pub(crate) fn set_last_pts(&mut self, pts: i64) {
        self.last_pts = pts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_keeps_last_pts() {
        let mut unit = AccessUnit::new();
        unit.fill(&[1, 2, 3], None, Some(900), 0, true).unwrap();
        unit.set_last_pts(900);
        unit.advance(3);
        unit.mark_consumed();
        assert!(!unit.is_valid());
        assert!(unit.payload().is_empty());

        unit.fill(&[4, 5], None, None, 0, false).unwrap();
        assert!(unit.is_valid());
        assert!(unit.pending_header());
        assert_eq!(unit.last_pts(), 900);

        unit.release();
        assert_eq!(unit.last_pts(), 0);
        assert!(!unit.is_valid());
    }

    #[test]
    fn cursors_track_partial_writes() {
        let mut unit = AccessUnit::new();
        unit.fill(&[1, 2, 3, 4], None, None, 0, false).unwrap();
        unit.attach_header(HeaderBlob::new(vec![9u8, 8, 7]));
        unit.advance_header(2);
        assert_eq!(unit.header_remaining(), &[7]);
        unit.clear_pending_header();
        assert!(unit.header_remaining().is_empty());

        unit.advance(1);
        assert_eq!(unit.remaining(), &[2, 3, 4]);
    }
}
