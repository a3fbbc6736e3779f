/// Video probing
///
/// The verifier only needs two numbers from a demonstration video: how many
/// frames it has and at what rate they play. [`Mp4Probe`] reads them from
/// ISO-BMFF container metadata without decoding any media.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Largest `moov` box we are willing to load
const MAX_MOOV_BYTES: u64 = 64 * 1024 * 1024;

/// Box types that may legitimately open an ISO-BMFF file
const LEADING_BOXES: &[&[u8; 4]] = &[b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pdin"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub fps: f64,
    pub frame_count: u64,
}

impl VideoInfo {
    /// Playback duration in seconds; zero when the rate is unknown
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// Not a video container, or no video track in it
    #[error("cannot open video: {0}")]
    Unopenable(String),

    #[error("{0}")]
    Failed(String),
}

pub trait VideoProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoInfo, ProbeError>;
}

/// Container-metadata probe for MP4 files
#[derive(Debug, Clone, Default)]
pub struct Mp4Probe;

impl VideoProbe for Mp4Probe {
    fn probe(&self, path: &Path) -> Result<VideoInfo, ProbeError> {
        let mut file = File::open(path)
            .map_err(|e| ProbeError::Unopenable(format!("{}: {}", path.display(), e)))?;
        let moov = read_moov(&mut file)?;
        let track = first_video_track(&moov)?
            .ok_or_else(|| ProbeError::Unopenable("no video track".to_string()))?;
        Ok(track.info())
    }
}

struct TrackTiming {
    timescale: u32,
    duration: u64,
    sample_count: u64,
}

impl TrackTiming {
    fn info(&self) -> VideoInfo {
        let seconds = if self.timescale > 0 {
            self.duration as f64 / self.timescale as f64
        } else {
            0.0
        };
        let fps = if seconds > 0.0 {
            self.sample_count as f64 / seconds
        } else {
            0.0
        };
        VideoInfo {
            fps,
            frame_count: self.sample_count,
        }
    }
}

/// Walk top-level boxes and load the movie box
fn read_moov<R: Read + Seek>(reader: &mut R) -> Result<Vec<u8>, ProbeError> {
    let file_len = reader
        .seek(SeekFrom::End(0))
        .map_err(|e| ProbeError::Failed(e.to_string()))?;
    let mut offset = 0u64;
    let mut first = true;

    while offset + 8 <= file_len {
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(|e| ProbeError::Failed(e.to_string()))?;
        let kind = [header[4], header[5], header[6], header[7]];

        if first {
            if !LEADING_BOXES.contains(&&kind) {
                return Err(ProbeError::Unopenable(
                    "not an ISO base media file".to_string(),
                ));
            }
            first = false;
        }

        let (size, header_len) = match u32::from_be_bytes([header[0], header[1], header[2], header[3]]) {
            0 => (file_len - offset, 8),
            1 => {
                let mut large = [0u8; 8];
                reader
                    .read_exact(&mut large)
                    .map_err(|e| ProbeError::Failed(e.to_string()))?;
                (u64::from_be_bytes(large), 16)
            }
            n => (n as u64, 8),
        };

        let end = offset
            .checked_add(size)
            .filter(|end| size >= header_len && *end <= file_len)
            .ok_or_else(|| {
                ProbeError::Failed(format!(
                    "malformed '{}' box at offset {}",
                    String::from_utf8_lossy(&kind),
                    offset
                ))
            })?;

        if &kind == b"moov" {
            let payload_len = size - header_len;
            if payload_len > MAX_MOOV_BYTES {
                return Err(ProbeError::Failed("movie header too large".to_string()));
            }
            let mut payload = vec![0u8; payload_len as usize];
            reader
                .read_exact(&mut payload)
                .map_err(|e| ProbeError::Failed(e.to_string()))?;
            return Ok(payload);
        }

        offset = end;
    }

    if first {
        Err(ProbeError::Unopenable("empty file".to_string()))
    } else {
        Err(ProbeError::Unopenable("no movie header".to_string()))
    }
}

/// Split a box payload into its child boxes
fn children(data: &[u8]) -> Result<Vec<([u8; 4], &[u8])>, ProbeError> {
    let mut boxes = Vec::new();
    let mut offset = 0usize;

    while offset + 8 <= data.len() {
        let size = read_u32(data, offset)? as usize;
        let kind = [
            data[offset + 4],
            data[offset + 5],
            data[offset + 6],
            data[offset + 7],
        ];
        let malformed = || {
            ProbeError::Failed(format!(
                "malformed '{}' box",
                String::from_utf8_lossy(&kind)
            ))
        };
        let (size, header_len) = match size {
            0 => (data.len() - offset, 8),
            1 => (
                usize::try_from(read_u64(data, offset + 8)?).map_err(|_| malformed())?,
                16,
            ),
            n => (n, 8),
        };
        let end = offset
            .checked_add(size)
            .filter(|end| size >= header_len && *end <= data.len())
            .ok_or_else(malformed)?;
        boxes.push((kind, &data[offset + header_len..end]));
        offset = end;
    }

    Ok(boxes)
}

fn child<'d>(data: &'d [u8], kind: &[u8; 4]) -> Result<Option<&'d [u8]>, ProbeError> {
    Ok(children(data)?
        .into_iter()
        .find(|(k, _)| k == kind)
        .map(|(_, payload)| payload))
}

fn first_video_track(moov: &[u8]) -> Result<Option<TrackTiming>, ProbeError> {
    for (kind, trak) in children(moov)? {
        if &kind != b"trak" {
            continue;
        }
        let Some(mdia) = child(trak, b"mdia")? else {
            continue;
        };
        let Some(hdlr) = child(mdia, b"hdlr")? else {
            continue;
        };
        // version/flags(4) pre_defined(4) handler_type(4)
        if hdlr.get(8..12) != Some(b"vide".as_slice()) {
            continue;
        }

        let mdhd = child(mdia, b"mdhd")?
            .ok_or_else(|| ProbeError::Failed("video track without media header".to_string()))?;
        let (timescale, duration) = parse_mdhd(mdhd)?;

        let stbl = child(mdia, b"minf")?
            .map(|minf| child(minf, b"stbl"))
            .transpose()?
            .flatten()
            .ok_or_else(|| ProbeError::Failed("video track without sample table".to_string()))?;

        let sample_count = match child(stbl, b"stsz")? {
            // version/flags(4) sample_size(4) sample_count(4)
            Some(stsz) => read_u32(stsz, 8)? as u64,
            None => match child(stbl, b"stts")? {
                Some(stts) => sum_stts(stts)?,
                None => 0,
            },
        };

        return Ok(Some(TrackTiming {
            timescale,
            duration,
            sample_count,
        }));
    }
    Ok(None)
}

fn parse_mdhd(mdhd: &[u8]) -> Result<(u32, u64), ProbeError> {
    match mdhd.first() {
        // version(1) flags(3) creation(8) modification(8) timescale(4) duration(8)
        Some(1) => Ok((read_u32(mdhd, 20)?, read_u64(mdhd, 24)?)),
        // version(1) flags(3) creation(4) modification(4) timescale(4) duration(4)
        Some(0) => Ok((read_u32(mdhd, 12)?, read_u32(mdhd, 16)? as u64)),
        Some(v) => Err(ProbeError::Failed(format!("unsupported mdhd version {}", v))),
        None => Err(ProbeError::Failed("empty media header".to_string())),
    }
}

fn sum_stts(stts: &[u8]) -> Result<u64, ProbeError> {
    let entries = read_u32(stts, 4)? as usize;
    let mut total = 0u64;
    for i in 0..entries {
        total += read_u32(stts, 8 + i * 8)? as u64;
    }
    Ok(total)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, ProbeError> {
    data.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| ProbeError::Failed(format!("unexpected end of box at {}", at)))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, ProbeError> {
    data.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| ProbeError::Failed(format!("unexpected end of box at {}", at)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Minimal ISO-BMFF writer for tests
    pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    pub fn video_file(handler: &[u8; 4], timescale: u32, duration: u32, frames: u32) -> Vec<u8> {
        let mut hdlr = vec![0u8; 8];
        hdlr.extend_from_slice(handler);
        hdlr.extend_from_slice(&[0u8; 12]);

        let mut mdhd = vec![0u8; 12];
        mdhd.extend_from_slice(&timescale.to_be_bytes());
        mdhd.extend_from_slice(&duration.to_be_bytes());
        mdhd.extend_from_slice(&[0u8; 4]);

        let mut stsz = vec![0u8; 8];
        stsz.extend_from_slice(&frames.to_be_bytes());

        let stbl = mp4_box(b"stbl", &mp4_box(b"stsz", &stsz));
        let minf = mp4_box(b"minf", &stbl);
        let mut mdia_payload = mp4_box(b"mdhd", &mdhd);
        mdia_payload.extend(mp4_box(b"hdlr", &hdlr));
        mdia_payload.extend(minf);
        let trak = mp4_box(b"trak", &mp4_box(b"mdia", &mdia_payload));

        let mut file = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2mp41");
        file.extend(mp4_box(b"moov", &trak));
        file.extend(mp4_box(b"mdat", &[0u8; 16]));
        file
    }
}
