use core::fmt;

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use rdpflow_core::{
    Buffer, BufferMut, CharacterSet, DecodeError, DecodeResult, Encode, EncodeResult,
};

/// Fixed byte length of each timezone name field, terminator included.
const TIMEZONE_NAME_LEN: usize = 64;
/// TS_SYSTEMTIME: eight 16-bit fields.
const SYSTEM_TIME_SIZE: usize = 16;
const TIMEZONE_INFO_SIZE: usize = 4 + TIMEZONE_NAME_LEN + SYSTEM_TIME_SIZE + 4 + TIMEZONE_NAME_LEN + SYSTEM_TIME_SIZE + 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULLWINDOWDRAG = 0x0000_0002;
        const DISABLE_MENUANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSORSETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum AddressFamily {
    INet = 0x0002,
    INet6 = 0x0017,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The password stays out of logs.
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

/// TS_TIME_ZONE_INFORMATION with the transition-date blocks zeroed; the
/// session host owns daylight-saving transitions, the client only
/// advertises its bias.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimezoneInfo {
    pub bias: u32,
    pub standard_name: String,
    pub standard_bias: u32,
    pub daylight_name: String,
    pub daylight_bias: u32,
}

impl TimezoneInfo {
    fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let bias = src.read_u32()?;
        let standard_name = src.read_string(TIMEZONE_NAME_LEN, CharacterSet::Unicode)?;
        src.skip(SYSTEM_TIME_SIZE)?;
        let standard_bias = src.read_u32()?;
        let daylight_name = src.read_string(TIMEZONE_NAME_LEN, CharacterSet::Unicode)?;
        src.skip(SYSTEM_TIME_SIZE)?;
        let daylight_bias = src.read_u32()?;

        Ok(Self {
            bias,
            standard_name,
            standard_bias,
            daylight_name,
            daylight_bias,
        })
    }

    fn encode(&self, dst: &mut BufferMut) {
        let write_name = |dst: &mut BufferMut, name: &str| {
            let start = dst.len();
            dst.write_string(name, CharacterSet::Unicode);
            debug_assert!(dst.len() - start <= TIMEZONE_NAME_LEN);
            dst.write_padding(TIMEZONE_NAME_LEN - (dst.len() - start));
        };

        dst.write_u32(self.bias);
        write_name(dst, &self.standard_name);
        dst.write_padding(SYSTEM_TIME_SIZE);
        dst.write_u32(self.standard_bias);
        write_name(dst, &self.daylight_name);
        dst.write_padding(SYSTEM_TIME_SIZE);
        dst.write_u32(self.daylight_bias);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub timezone: TimezoneInfo,
    pub session_id: u32,
    pub performance_flags: PerformanceFlags,
}

impl ExtendedClientInfo {
    fn decode(src: &mut Buffer, charset: CharacterSet) -> DecodeResult<Self> {
        let address_family = AddressFamily::from_u16(src.read_u16()?)
            .ok_or_else(|| DecodeError::invalid_field("clientAddressFamily", "unknown family"))?;

        // These sizes include the mandatory terminator.
        let address_size = usize::from(src.read_u16()?);
        let address = src.read_string(address_size, charset)?;
        let dir_size = usize::from(src.read_u16()?);
        let dir = src.read_string(dir_size, charset)?;

        let timezone = TimezoneInfo::decode(src)?;
        let session_id = src.read_u32()?;
        let performance_flags = PerformanceFlags::from_bits(src.read_u32()?)
            .ok_or_else(|| DecodeError::invalid_field("performanceFlags", "unknown flag bits"))?;

        let reconnect_cookie_length = src.read_u16()?;
        if reconnect_cookie_length != 0 {
            src.skip(usize::from(reconnect_cookie_length))?;
        }

        Ok(Self {
            address_family,
            address,
            dir,
            timezone,
            session_id,
            performance_flags,
        })
    }

    fn encode(&self, dst: &mut BufferMut, charset: CharacterSet) {
        let unit: u16 = match charset {
            CharacterSet::Ansi => 1,
            CharacterSet::Unicode => 2,
        };

        dst.write_u16(self.address_family.to_u16().unwrap_or_default());

        dst.write_u16(string_len(&self.address, charset) + unit);
        dst.write_string_nul(&self.address, charset);
        dst.write_u16(string_len(&self.dir, charset) + unit);
        dst.write_string_nul(&self.dir, charset);

        self.timezone.encode(dst);
        dst.write_u32(self.session_id);
        dst.write_u32(self.performance_flags.bits());
        dst.write_u16(0); // cbAutoReconnectCookie
    }

    fn size(&self, charset: CharacterSet) -> usize {
        let unit = charset.unit_size();
        2 + 2
            + usize::from(string_len(&self.address, charset)) + unit
            + 2
            + usize::from(string_len(&self.dir, charset)) + unit
            + TIMEZONE_INFO_SIZE
            + 4 // sessionId
            + 4 // performanceFlags
            + 2 // cbAutoReconnectCookie
    }
}

/// TS_INFO_PACKET: the credentials, locale and environment the client
/// logs in with. Sent exactly once, after the channel joins complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    fn charset(&self) -> CharacterSet {
        if self.flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        }
    }

    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let code_page = src.read_u32()?;
        let flags = ClientInfoFlags::from_bits(src.read_u32()?)
            .ok_or_else(|| DecodeError::invalid_field("flags", "unknown flag bits"))?;
        let charset = if flags.contains(ClientInfoFlags::UNICODE) {
            CharacterSet::Unicode
        } else {
            CharacterSet::Ansi
        };
        let unit = charset.unit_size();

        // These sizes exclude the mandatory terminator.
        let domain_size = usize::from(src.read_u16()?);
        let username_size = usize::from(src.read_u16()?);
        let password_size = usize::from(src.read_u16()?);
        let alternate_shell_size = usize::from(src.read_u16()?);
        let work_dir_size = usize::from(src.read_u16()?);

        let mut read_terminated = |src: &mut Buffer, size: usize| -> DecodeResult<String> {
            let value = src.read_string(size, charset)?;
            src.skip(unit)?;
            Ok(value)
        };

        let domain = read_terminated(src, domain_size)?;
        let username = read_terminated(src, username_size)?;
        let password = read_terminated(src, password_size)?;
        let alternate_shell = read_terminated(src, alternate_shell_size)?;
        let work_dir = read_terminated(src, work_dir_size)?;

        let extra = ExtendedClientInfo::decode(src, charset)?;

        Ok(Self {
            credentials: Credentials {
                username,
                password,
                domain: if domain.is_empty() { None } else { Some(domain) },
            },
            code_page,
            flags,
            alternate_shell,
            work_dir,
            extra,
        })
    }
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        let charset = self.charset();
        let domain = self.credentials.domain.clone().unwrap_or_default();

        dst.write_u32(self.code_page);
        dst.write_u32(self.flags.bits());

        dst.write_u16(string_len(&domain, charset));
        dst.write_u16(string_len(&self.credentials.username, charset));
        dst.write_u16(string_len(&self.credentials.password, charset));
        dst.write_u16(string_len(&self.alternate_shell, charset));
        dst.write_u16(string_len(&self.work_dir, charset));

        dst.write_string_nul(&domain, charset);
        dst.write_string_nul(&self.credentials.username, charset);
        dst.write_string_nul(&self.credentials.password, charset);
        dst.write_string_nul(&self.alternate_shell, charset);
        dst.write_string_nul(&self.work_dir, charset);

        self.extra.encode(dst, charset);
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let charset = self.charset();
        let unit = charset.unit_size();
        let domain = self.credentials.domain.as_deref().unwrap_or("");

        4 + 4
            + 2 * 5
            + usize::from(string_len(domain, charset))
            + usize::from(string_len(&self.credentials.username, charset))
            + usize::from(string_len(&self.credentials.password, charset))
            + usize::from(string_len(&self.alternate_shell, charset))
            + usize::from(string_len(&self.work_dir, charset))
            + unit * 5
            + self.extra.size(charset)
    }
}

fn string_len(value: &str, charset: CharacterSet) -> u16 {
    let length = match charset {
        CharacterSet::Ansi => value.len(),
        CharacterSet::Unicode => value.encode_utf16().count() * 2,
    };
    length.try_into().unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpflow_core::encode_to_buffer;

    fn reference_info() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: "vlisivka".to_owned(),
                password: String::new(),
                domain: None,
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE
                | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
                | ClientInfoFlags::UNICODE
                | ClientInfoFlags::MAXIMIZE_SHELL
                | ClientInfoFlags::ENABLE_WINDOWS_KEY,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: "192.168.0.100".to_owned(),
                dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
                timezone: TimezoneInfo::default(),
                session_id: 0,
                performance_flags: PerformanceFlags::DISABLE_WALLPAPER
                    | PerformanceFlags::DISABLE_FULLWINDOWDRAG
                    | PerformanceFlags::DISABLE_MENUANIMATIONS,
            },
        }
    }

    #[test]
    fn round_trip() {
        let info = reference_info();
        let mut encoded = encode_to_buffer(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded = ClientInfo::decode(&mut encoded).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(encoded.remaining(), 0);
    }

    #[test]
    fn reference_body_length() {
        // 18 fixed + 26 login strings + 98 address/dir + 172 timezone
        // + 10 trailing = 324; the framing layers on top make this the
        // documented 343-byte packet.
        assert_eq!(reference_info().size(), 324);
    }
}
