//! Wi-Fi management commands: station association, addressing, soft-AP,
//! and access-point scanning.

use embedded_hal::delay::DelayNs;
use log::info;

use crate::engine::CommandEngine;
use crate::error::{CommandError, Result};
use crate::link::Transport;
use crate::link::scanner::parse_decimal;
use crate::time::Clock;

/// Radio role of the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    Station = 1,
    SoftAp = 2,
    StationAndSoftAp = 3,
}

impl WifiMode {
    fn from_ordinal(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::Station),
            2 => Some(Self::SoftAp),
            3 => Some(Self::StationAndSoftAp),
            _ => None,
        }
    }
}

/// Station addressing and association state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IpConfig {
    pub ip: heapless::String<16>,
    pub gateway: heapless::String<16>,
    pub netmask: heapless::String<16>,
    pub ssid: heapless::String<33>,
    pub mac: heapless::String<18>,
}

/// One access point from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApInfo {
    /// Encryption scheme ordinal (0 = open, 3 = WPA2-PSK, …).
    pub enc: u8,
    pub ssid: heapless::String<33>,
    pub rssi: i16,
    pub mac: heapless::String<18>,
    pub channel: u8,
}

impl<T: Transport, C: Clock, D: DelayNs> CommandEngine<T, C, D> {
    // ─── Mode ─────────────────────────────────────────────────────────────

    pub fn wifi_mode(&mut self) -> Result<WifiMode> {
        self.exchange(
            "AT+CWMODE?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        let body = self
            .scanner
            .find_between(b"+CWMODE:", b"\r\n")
            .ok_or(CommandError::Parse)?;
        parse_decimal(body)
            .and_then(WifiMode::from_ordinal)
            .ok_or(CommandError::Parse.into())
    }

    pub fn set_wifi_mode(&mut self, mode: WifiMode) -> Result<()> {
        let cmd = format!("AT+CWMODE={}", mode as u8);
        // "no change" is a success response on older firmware.
        match self.exchange(
            &cmd,
            &[b"OK", b"no change", b"ERROR"],
            self.config.probe_timeout_ms,
        )? {
            0 | 1 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    // ─── Station association ──────────────────────────────────────────────

    /// Join an access point. Blocks for up to the configured join window,
    /// since association plus DHCP routinely takes several seconds.
    pub fn join_ap(&mut self, ssid: &str, password: &str) -> Result<()> {
        info!("wifi: joining \"{ssid}\"");
        let cmd = format!("AT+CWJAP=\"{ssid}\",\"{password}\"");
        match self.exchange(
            &cmd,
            &[b"OK", b"FAIL", b"ERROR"],
            self.config.join_timeout_ms,
        )? {
            0 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    pub fn leave_ap(&mut self) -> Result<()> {
        self.simple_cmd("AT+CWQAP", self.config.probe_timeout_ms)
    }

    /// Enable or disable the DHCP client for the given role
    /// (1 = station, 2 = soft-AP, 3 = both).
    pub fn set_dhcp(&mut self, mode: u8, enable: bool) -> Result<()> {
        let cmd = format!("AT+CWDHCP={mode},{}", u8::from(enable));
        match self.exchange(&cmd, &[b"OK", b"FAIL", b"ERROR"], 10_000)? {
            0 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    /// Assign a static station address, replacing DHCP. Gateway and
    /// netmask travel together; the firmware rejects one without the other.
    pub fn set_station_ip(
        &mut self,
        ip: &str,
        gateway_netmask: Option<(&str, &str)>,
    ) -> Result<()> {
        let cmd = match gateway_netmask {
            Some((gw, nm)) => format!("AT+CIPSTA_CUR=\"{ip}\",\"{gw}\",\"{nm}\""),
            None => format!("AT+CIPSTA_CUR=\"{ip}\""),
        };
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    /// Station address as reported by `AT+CIFSR`.
    pub fn local_ip(&mut self) -> Result<heapless::String<16>> {
        self.exchange("AT+CIFSR", &[b"OK", b"ERROR"], 5000)?;
        let mut ip = heapless::String::new();
        copy_quoted(&mut ip, self.scanner.find_between(b"STAIP,\"", b"\""))?;
        Ok(ip)
    }

    // ─── Addressing ───────────────────────────────────────────────────────

    /// Current station addressing, merged from `AT+CIPSTA?` and `AT+CWJAP?`.
    pub fn ip_config(&mut self) -> Result<IpConfig> {
        let mut cfg = IpConfig::default();

        self.exchange(
            "AT+CIPSTA?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        copy_quoted(&mut cfg.ip, self.scanner.find_between(b"ip:\"", b"\""))?;
        copy_quoted(
            &mut cfg.gateway,
            self.scanner.find_between(b"gateway:\"", b"\""),
        )?;
        copy_quoted(
            &mut cfg.netmask,
            self.scanner.find_between(b"netmask:\"", b"\""),
        )?;

        // Not associated: ssid and mac stay empty.
        if self
            .exchange(
                "AT+CWJAP?",
                &[b"OK", b"ERROR"],
                self.config.probe_timeout_ms,
            )
            .is_ok()
        {
            let _ = copy_quoted(&mut cfg.ssid, self.scanner.find_between(b"+CWJAP:\"", b"\""));
            let _ = copy_quoted(&mut cfg.mac, self.scanner.find_between(b"\",\"", b"\""));
        }
        Ok(cfg)
    }

    pub fn hostname(&mut self) -> Result<heapless::String<32>> {
        self.exchange(
            "AT+CWHOSTNAME?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        let mut name = heapless::String::new();
        copy_quoted(
            &mut name,
            self.scanner.find_between(b"+CWHOSTNAME:", b"\r\n"),
        )?;
        Ok(name)
    }

    pub fn set_hostname(&mut self, name: &str) -> Result<()> {
        let cmd = format!("AT+CWHOSTNAME=\"{name}\"");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn mac(&mut self) -> Result<heapless::String<18>> {
        self.exchange(
            "AT+CIPSTAMAC?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        let mut mac = heapless::String::new();
        copy_quoted(
            &mut mac,
            self.scanner.find_between(b"+CIPSTAMAC:\"", b"\""),
        )?;
        Ok(mac)
    }

    pub fn set_mac(&mut self, mac: &str) -> Result<()> {
        let cmd = format!("AT+CIPSTAMAC=\"{mac}\"");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    // ─── Soft-AP ──────────────────────────────────────────────────────────

    /// Configure the soft-AP. Switches to the combined station+AP mode
    /// first, which the firmware requires before `AT+CWSAP` is accepted.
    pub fn set_softap_config(
        &mut self,
        ssid: &str,
        password: &str,
        channel: u8,
        enc: u8,
    ) -> Result<()> {
        self.set_wifi_mode(WifiMode::StationAndSoftAp)?;
        let cmd = format!("AT+CWSAP=\"{ssid}\",\"{password}\",{channel},{enc}");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn softap_config(&mut self) -> Result<ApInfo> {
        self.exchange(
            "AT+CWSAP?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        let body = self
            .scanner
            .find_between(b"+CWSAP:", b"\r\n")
            .ok_or(CommandError::Parse)?;
        // +CWSAP:"ssid","password",channel,enc
        let mut info = ApInfo {
            enc: 0,
            ssid: heapless::String::new(),
            rssi: 0,
            mac: heapless::String::new(),
            channel: 0,
        };
        let mut fields = split_response_fields(body);
        copy_str(&mut info.ssid, fields.next().ok_or(CommandError::Parse)?)?;
        let _password = fields.next().ok_or(CommandError::Parse)?;
        info.channel = parse_field(fields.next())? as u8;
        info.enc = parse_field(fields.next())? as u8;
        Ok(info)
    }

    // ─── Scanning ─────────────────────────────────────────────────────────

    /// Run a full scan and stash the results for [`ap_scan_next`].
    ///
    /// The scan itself can take the better part of ten seconds; results
    /// are then walked without further traffic on the link.
    ///
    /// [`ap_scan_next`]: Self::ap_scan_next
    pub fn ap_scan_begin(&mut self) -> Result<()> {
        if self.exchange("AT+CWLAP", &[b"\r\nOK", b"ERROR"], 10_000)? != 0 {
            return Err(CommandError::Rejected.into());
        }
        self.listing.clear();
        self.listing.extend_from_slice(self.scanner.window());
        self.listing_pos = 0;
        Ok(())
    }

    /// Next access point from the stored scan, or `None` when exhausted.
    pub fn ap_scan_next(&mut self) -> Result<Option<ApInfo>> {
        let Some(body) = self.next_listing_item(b"+CWLAP:(", b")") else {
            return Ok(None);
        };
        // +CWLAP:(enc,"ssid",rssi,"mac",channel)
        let mut info = ApInfo {
            enc: 0,
            ssid: heapless::String::new(),
            rssi: 0,
            mac: heapless::String::new(),
            channel: 0,
        };
        let mut fields = split_response_fields(&body);
        info.enc = parse_field(fields.next())? as u8;
        copy_str(&mut info.ssid, fields.next().ok_or(CommandError::Parse)?)?;
        info.rssi = parse_signed(fields.next().ok_or(CommandError::Parse)?)
            .ok_or(CommandError::Parse)? as i16;
        copy_str(&mut info.mac, fields.next().ok_or(CommandError::Parse)?)?;
        info.channel = parse_field(fields.next())? as u8;
        Ok(Some(info))
    }

    /// Pull the next `begin…end` item out of the stored listing.
    pub(crate) fn next_listing_item(&mut self, begin: &[u8], end: &[u8]) -> Option<Vec<u8>> {
        use crate::link::scanner::find;
        let rest = &self.listing[self.listing_pos..];
        let from = find(rest, begin)? + begin.len();
        let to = from + find(&rest[from..], end)?;
        let item = rest[from..to].to_vec();
        self.listing_pos += to + end.len();
        Some(item)
    }
}

// ─── Response field helpers ───────────────────────────────────────────────

/// Split a comma-separated response body, honoring quoted fields.
pub(crate) fn split_response_fields(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = body;
    core::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut in_quotes = false;
        let mut split = rest.len();
        for (i, &b) in rest.iter().enumerate() {
            match b {
                b'"' => in_quotes = !in_quotes,
                b',' if !in_quotes => {
                    split = i;
                    break;
                }
                _ => {}
            }
        }
        let field = &rest[..split];
        rest = if split < rest.len() {
            &rest[split + 1..]
        } else {
            &[]
        };
        Some(strip_quotes(field))
    })
}

fn strip_quotes(field: &[u8]) -> &[u8] {
    if field.len() >= 2 && field.first() == Some(&b'"') && field.last() == Some(&b'"') {
        &field[1..field.len() - 1]
    } else {
        field
    }
}

pub(crate) fn parse_signed(bytes: &[u8]) -> Option<i32> {
    match bytes.split_first() {
        Some((b'-', rest)) => parse_decimal(rest).map(|v| -(v as i32)),
        _ => parse_decimal(bytes).map(|v| v as i32),
    }
}

fn parse_field(field: Option<&[u8]>) -> Result<u32> {
    field
        .and_then(parse_decimal)
        .ok_or(CommandError::Parse.into())
}

fn copy_str<const N: usize>(dst: &mut heapless::String<N>, src: &[u8]) -> Result<()> {
    let text = core::str::from_utf8(src).map_err(|_| CommandError::Parse)?;
    dst.push_str(text).map_err(|_| CommandError::Parse)?;
    Ok(())
}

fn copy_quoted<const N: usize>(dst: &mut heapless::String<N>, src: Option<&[u8]>) -> Result<()> {
    let src = src.ok_or(CommandError::Parse)?;
    copy_str(dst, strip_quotes(src))
}
