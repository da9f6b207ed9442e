use core::fmt::Debug;
use core::fmt::Display;
use std::path::PathBuf;

pub enum Error {
    NoDeviceFound,
    DeviceList(pcap::Error),
    DeviceUnavailable {
        device: String,
        source: pcap::Error,
    },
    FilterRejected {
        filter: String,
        source: pcap::Error,
    },
    CaptureFile {
        path: PathBuf,
        source: pcap::Error,
    },
    ReadFailed(pcap::Error),
}

impl Error {
    /// Whether the capture could not be set up at all. These end the session
    /// before the first frame is read.
    #[must_use]
    pub fn is_capture_unavailable(&self) -> bool {
        !matches!(self, Error::ReadFailed(_))
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::NoDeviceFound => None,
            Error::DeviceList(source)
            | Error::DeviceUnavailable { source, .. }
            | Error::FilterRejected { source, .. }
            | Error::CaptureFile { source, .. }
            | Error::ReadFailed(source) => Some(source),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NoDeviceFound => write!(f, "No capture device found"),
            Error::DeviceList(e) => write!(f, "Cannot list capture devices: {e}"),
            Error::DeviceUnavailable { device, source } => {
                write!(f, "Cannot open device {device}: {source}")
            }
            Error::FilterRejected { filter, source } => {
                write!(f, "Invalid capture filter \"{filter}\": {source}")
            }
            Error::CaptureFile { path, source } => {
                write!(f, "Cannot open capture file {}: {source}", path.display())
            }
            Error::ReadFailed(e) => write!(f, "Capture read failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::FilterRejected {
            filter: "tcp port".to_owned(),
            source: pcap::Error::PcapError("syntax error".to_owned()),
        };
        assert!(err.is_capture_unavailable());
        assert!(err.to_string().contains("tcp port"));
        assert!(err.to_string().contains("syntax error"));

        let err = Error::ReadFailed(pcap::Error::PcapError("interface went down".to_owned()));
        assert!(!err.is_capture_unavailable());
        assert!(core::error::Error::source(&err).is_some());
    }
}
