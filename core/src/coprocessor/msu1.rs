//! MSU-1 streaming data and audio.
//!
//! Register window `$2000-$2007`:
//!
//! | addr  | read                      | write                          |
//! |-------|---------------------------|--------------------------------|
//! | $2000 | status / revision         | data seek offset bits 7:0      |
//! | $2001 | data port (auto-advance)  | data seek offset bits 15:8     |
//! | $2002 | 'S'                       | data seek offset bits 23:16    |
//! | $2003 | '-'                       | data seek bits 31:24, seek     |
//! | $2004 | 'M'                       | audio track bits 7:0           |
//! | $2005 | 'S'                       | audio track bits 15:8, open    |
//! | $2006 | 'U'                       | volume                         |
//! | $2007 | '1'                       | play / repeat / resume control |
//!
//! Audio tracks are 44.1 kHz stereo 16-bit PCM with an 8-byte header
//! (`"MSU1"` plus a little-endian loop point in samples). The host supplies
//! the files through [`MsuMedia`]; media is never part of a save state.

use std::any::Any;
use std::collections::HashMap;

use log::debug;

use super::Coprocessor;
use crate::core::clock::drive;
use crate::core::{
    AddressLookup, BusContender, BusOwnership, CartMemory, ClockDivider, ClockError, ClockRatio,
    Component, MemoryHandler, Segment, SegmentKind,
};
use crate::snapshot::Snapshot;

pub const REVISION: u8 = 2;
pub const SAMPLE_RATE: u64 = 44_100;
pub const MASTER_CLOCK_HZ: u64 = 21_477_272;

const IDENT: &[u8; 6] = b"S-MSU1";
const HEADER_LEN: u32 = 8;
const BYTES_PER_SAMPLE: u32 = 4;
const NO_RESUME: u16 = 0xFFFF;

const STATUS_REPEAT: u8 = 0x20;
const STATUS_PLAYING: u8 = 0x10;
const STATUS_ERROR: u8 = 0x08;

/// Host-provided MSU-1 files.
pub trait MsuMedia {
    /// The data file (`.msu`).
    fn data(&self) -> &[u8];

    /// The PCM file for `track`, header included.
    fn track(&self, track: u16) -> Option<&[u8]>;
}

/// In-memory media, for tests and hosts that preload everything.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedia {
    pub data: Vec<u8>,
    pub tracks: HashMap<u16, Vec<u8>>,
}

impl MsuMedia for MemoryMedia {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn track(&self, track: u16) -> Option<&[u8]> {
        self.tracks.get(&track).map(Vec::as_slice)
    }
}

/// Build a PCM track image: header, loop point and `samples`.
pub fn pcm_track(loop_sample: u32, samples: &[(i16, i16)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN as usize + samples.len() * 4);
    out.extend_from_slice(b"MSU1");
    out.extend_from_slice(&loop_sample.to_le_bytes());
    for &(left, right) in samples {
        out.extend_from_slice(&left.to_le_bytes());
        out.extend_from_slice(&right.to_le_bytes());
    }
    out
}

#[derive(Snapshot)]
pub struct Msu1 {
    #[snapshot(skip)]
    media: Box<dyn MsuMedia>,
    #[snapshot(nested)]
    divider: ClockDivider, // 44.1 kHz from the master clock
    last_master: u64,
    data_seek: u32,
    data_offset: u32,
    track: u16,
    volume: u8,
    playing: bool,
    repeat: bool,
    error: bool,
    play_offset: u32,
    loop_offset: u32,
    resume_track: u16,
    resume_offset: u32,
    #[snapshot(skip)]
    pending: Vec<(i16, i16)>,
    #[snapshot(skip)]
    frame_samples: Vec<(i16, i16)>,
}

impl Msu1 {
    pub fn new(media: Box<dyn MsuMedia>) -> Result<Self, ClockError> {
        let mut msu = Self {
            media,
            divider: ClockDivider::new(ClockRatio::UNITY),
            last_master: 0,
            data_seek: 0,
            data_offset: 0,
            track: 0,
            volume: 0xFF,
            playing: false,
            repeat: false,
            error: false,
            play_offset: HEADER_LEN,
            loop_offset: HEADER_LEN,
            resume_track: NO_RESUME,
            resume_offset: 0,
            pending: Vec::new(),
            frame_samples: Vec::new(),
        };
        msu.divider = ClockDivider::new(msu.clock_ratio()?);
        Ok(msu)
    }

    pub fn set_media(&mut self, media: Box<dyn MsuMedia>) {
        self.media = media;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play_offset(&self) -> u32 {
        self.play_offset
    }

    pub fn data_offset(&self) -> u32 {
        self.data_offset
    }

    /// Samples produced during the last completed frame.
    pub fn frame_samples(&self) -> &[(i16, i16)] {
        &self.frame_samples
    }

    fn status(&self) -> u8 {
        let mut status = REVISION;
        if self.repeat {
            status |= STATUS_REPEAT;
        }
        if self.playing {
            status |= STATUS_PLAYING;
        }
        if self.error {
            status |= STATUS_ERROR;
        }
        status
    }

    fn peek_register(&self, address: u32) -> Option<u8> {
        match address {
            0x2000 => Some(self.status()),
            0x2001 => Some(self.media.data().get(self.data_offset as usize).copied().unwrap_or(0)),
            0x2002..=0x2007 => Some(IDENT[(address - 0x2002) as usize]),
            _ => None,
        }
    }

    fn set_byte(word: &mut u32, byte: u32, value: u8) {
        let shift = byte * 8;
        *word = (*word & !(0xFF << shift)) | (value as u32) << shift;
    }

    fn open_track(&mut self) {
        self.playing = false;
        self.repeat = false;
        self.play_offset = HEADER_LEN;
        if self.track == self.resume_track {
            self.play_offset = self.resume_offset;
            self.resume_track = NO_RESUME;
            self.resume_offset = 0;
        }
        match self.media.track(self.track) {
            Some(pcm) if pcm.len() >= HEADER_LEN as usize && &pcm[..4] == b"MSU1" => {
                let loop_sample = u32::from_le_bytes([pcm[4], pcm[5], pcm[6], pcm[7]]);
                let loop_offset = HEADER_LEN.saturating_add(loop_sample.saturating_mul(BYTES_PER_SAMPLE));
                self.loop_offset = if loop_offset as usize > pcm.len() { HEADER_LEN } else { loop_offset };
                self.error = false;
            }
            _ => {
                debug!("MSU-1: track {} missing", self.track);
                self.error = true;
            }
        }
    }

    fn control(&mut self, value: u8) {
        if self.error {
            return;
        }
        self.playing = value & 0x01 != 0;
        self.repeat = value & 0x02 != 0;
        if !self.playing && value & 0x04 != 0 {
            self.resume_track = self.track;
            self.resume_offset = self.play_offset;
        }
    }
}

impl Component for Msu1 {
    /// One 44.1 kHz sample period. Returns true when the track ends.
    fn tick(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        let Some(pcm) = self.media.track(self.track) else {
            self.playing = false;
            return true;
        };
        let at = self.play_offset as usize;
        if at + BYTES_PER_SAMPLE as usize > pcm.len() {
            if self.repeat {
                self.play_offset = self.loop_offset;
            } else {
                self.playing = false;
                self.play_offset = HEADER_LEN;
            }
            return true;
        }
        let volume = self.volume as i32;
        let left = i16::from_le_bytes([pcm[at], pcm[at + 1]]) as i32 * volume / 255;
        let right = i16::from_le_bytes([pcm[at + 2], pcm[at + 3]]) as i32 * volume / 255;
        self.pending.push((left as i16, right as i16));
        self.play_offset += BYTES_PER_SAMPLE;
        false
    }

    fn clock_ratio(&self) -> Result<ClockRatio, ClockError> {
        ClockRatio::new(SAMPLE_RATE, MASTER_CLOCK_HZ)
    }
}

impl BusContender for Msu1 {
    fn ownership(&self) -> BusOwnership {
        BusOwnership::PRIMARY
    }

    fn conflict_read(&self, _segment: Segment, _address: u32, open_bus: u8) -> u8 {
        open_bus
    }
}

impl MemoryHandler for Msu1 {
    type Context = CartMemory;

    fn read(&mut self, address: u32, _cart: &mut CartMemory) -> Option<u8> {
        let value = self.peek_register(address);
        if address == 0x2001 && (self.data_offset as usize) < self.media.data().len() {
            self.data_offset += 1;
        }
        value
    }

    fn peek(&self, address: u32, _cart: &CartMemory) -> Option<u8> {
        self.peek_register(address)
    }

    fn write(&mut self, address: u32, value: u8, _cart: &mut CartMemory) {
        match address {
            0x2000..=0x2002 => Self::set_byte(&mut self.data_seek, address - 0x2000, value),
            0x2003 => {
                Self::set_byte(&mut self.data_seek, 3, value);
                self.data_offset = self.data_seek;
            }
            0x2004 => self.track = (self.track & 0xFF00) | value as u16,
            0x2005 => {
                self.track = (self.track & 0x00FF) | (value as u16) << 8;
                self.open_track();
            }
            0x2006 => self.volume = value,
            0x2007 => self.control(value),
            _ => {}
        }
    }

    fn absolute_address(&self, address: u32) -> AddressLookup {
        match address {
            0x2000..=0x2007 => AddressLookup::mapped(address - 0x2000, SegmentKind::Register),
            _ => AddressLookup::OpenBus,
        }
    }
}

impl Coprocessor for Msu1 {
    fn name(&self) -> &'static str {
        "msu1"
    }

    fn reset(&mut self) {
        self.data_seek = 0;
        self.data_offset = 0;
        self.track = 0;
        self.volume = 0xFF;
        self.playing = false;
        self.repeat = false;
        self.error = false;
        self.play_offset = HEADER_LEN;
        self.loop_offset = HEADER_LEN;
        self.resume_track = NO_RESUME;
        self.resume_offset = 0;
        self.pending.clear();
    }

    fn run(&mut self, master_clock: u64, _cart: &mut CartMemory) {
        let elapsed = master_clock.saturating_sub(self.last_master);
        self.last_master = master_clock;
        let mut divider = self.divider;
        drive(self, &mut divider, elapsed);
        self.divider = divider;
    }

    fn process_end_of_frame(&mut self) {
        std::mem::swap(&mut self.frame_samples, &mut self.pending);
        self.pending.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
