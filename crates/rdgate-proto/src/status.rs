//! Protocol status codes
//!
//! Carried by backend `error` instructions and echoed to HTTP clients so a
//! browser can tell a bad request from an upstream failure.

/// Numeric status reported alongside protocol-level errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Success = 0x0000,
    Unsupported = 0x0100,
    ServerError = 0x0200,
    ServerBusy = 0x0201,
    UpstreamTimeout = 0x0202,
    UpstreamError = 0x0203,
    ResourceNotFound = 0x0204,
    ResourceConflict = 0x0205,
    ResourceClosed = 0x0206,
    ClientBadRequest = 0x0300,
    ClientUnauthorized = 0x0301,
    ClientForbidden = 0x0303,
    ClientTimeout = 0x0308,
    ClientOverrun = 0x030D,
    ClientBadType = 0x030F,
    ClientTooMany = 0x031D,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Map a numeric code to a status, falling back to the class default
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => Status::Success,
            0x0100 => Status::Unsupported,
            0x0200 => Status::ServerError,
            0x0201 => Status::ServerBusy,
            0x0202 => Status::UpstreamTimeout,
            0x0203 => Status::UpstreamError,
            0x0204 => Status::ResourceNotFound,
            0x0205 => Status::ResourceConflict,
            0x0206 => Status::ResourceClosed,
            0x0300 => Status::ClientBadRequest,
            0x0301 => Status::ClientUnauthorized,
            0x0303 => Status::ClientForbidden,
            0x0308 => Status::ClientTimeout,
            0x030D => Status::ClientOverrun,
            0x030F => Status::ClientBadType,
            0x031D => Status::ClientTooMany,
            0x0300..=0x03FF => Status::ClientBadRequest,
            _ => Status::ServerError,
        }
    }

    /// Parse the decimal code carried as an instruction argument
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<u16>().ok().map(Self::from_code)
    }

    pub fn is_client_error(self) -> bool {
        (0x0300..0x0400).contains(&self.code())
    }
}
