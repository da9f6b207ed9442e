use crate::error::Error;
use crate::packet::{Frame, Timestamp};
use pcap::{Activated, Active, Capture, Device, Offline, PacketHeader};
use std::path::Path;
use tracing::{debug, info};

const SNAPLEN: i32 = 65536;
const READ_TIMEOUT_MS: i32 = 1000;
const BUFFER_SIZE: i32 = 1_000_000;

/// Outcome of one pull from a [`FrameSource`].
#[derive(Debug)]
pub enum Pulled {
    Frame(Frame),
    /// The read timeout expired without a frame. Pull again.
    Timeout,
    /// The source has no more frames.
    Exhausted,
}

/// Supplier of raw link-layer frames. Implementations block for at most
/// their read timeout in `next_frame`.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Pulled, Error>;

    /// Release the underlying capture. Later pulls report `Exhausted`.
    fn stop(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub description: Option<String>,
}

/// Enumerate the capture devices libpcap can open.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Error> {
    let devices = Device::list().map_err(Error::DeviceList)?;
    Ok(devices
        .into_iter()
        .map(|device| DeviceInfo {
            name: device.name,
            description: device.desc,
        })
        .collect())
}

enum Handle {
    Live(Capture<Active>),
    Offline(Capture<Offline>),
}

/// libpcap-backed frame source, either a live interface or a capture file.
pub struct PcapSource {
    handle: Option<Handle>,
}

impl PcapSource {
    /// Open `device` (or the default device) in promiscuous mode.
    pub fn live(device: Option<&str>, filter: &str) -> Result<Self, Error> {
        let device = match device {
            Some(name) => Device::from(name),
            None => Device::lookup()
                .map_err(Error::DeviceList)?
                .ok_or(Error::NoDeviceFound)?,
        };
        let name = device.name.clone();

        info!(
            "Monitoring device: {} ({})",
            device.name,
            device.desc.as_deref().unwrap_or("no description")
        );

        let mut cap = Capture::from_device(device)
            .and_then(|cap| {
                cap.promisc(true)
                    .snaplen(SNAPLEN)
                    .timeout(READ_TIMEOUT_MS)
                    .buffer_size(BUFFER_SIZE)
                    .open()
            })
            .map_err(|source| Error::DeviceUnavailable {
                device: name,
                source,
            })?;
        apply_filter(&mut cap, filter)?;

        Ok(Self {
            handle: Some(Handle::Live(cap)),
        })
    }

    /// Replay frames from a pcap file.
    pub fn offline(path: &Path, filter: &str) -> Result<Self, Error> {
        let mut cap = Capture::from_file(path).map_err(|source| Error::CaptureFile {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Reading capture file: {}", path.display());
        apply_filter(&mut cap, filter)?;

        Ok(Self {
            handle: Some(Handle::Offline(cap)),
        })
    }
}

fn apply_filter<T: Activated + ?Sized>(cap: &mut Capture<T>, filter: &str) -> Result<(), Error> {
    if filter.trim().is_empty() {
        debug!("No capture filter installed");
        return Ok(());
    }
    cap.filter(filter, true)
        .map_err(|source| Error::FilterRejected {
            filter: filter.to_owned(),
            source,
        })
}

// time_t is not 64 bits on every target
#[allow(clippy::useless_conversion)]
fn timestamp(header: &PacketHeader) -> Timestamp {
    Timestamp::new(
        i64::from(header.ts.tv_sec),
        u32::try_from(header.ts.tv_usec).unwrap_or_default(),
    )
}

impl FrameSource for PcapSource {
    fn next_frame(&mut self) -> Result<Pulled, Error> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(Pulled::Exhausted);
        };
        let packet = match handle {
            Handle::Live(cap) => cap.next_packet(),
            Handle::Offline(cap) => cap.next_packet(),
        };

        match packet {
            Ok(packet) => {
                Ok(Pulled::Frame(Frame {
                    timestamp: timestamp(packet.header),
                    data: packet.data.to_vec(),
                    wire_len: usize::try_from(packet.header.len).unwrap_or(usize::MAX),
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(Pulled::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(Pulled::Exhausted),
            Err(e) => Err(Error::ReadFailed(e)),
        }
    }

    fn stop(&mut self) {
        if self.handle.take().is_some() {
            debug!("Capture handle closed");
        }
    }
}
