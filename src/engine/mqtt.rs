//! MQTT client commands (`AT+MQTT*` family).
//!
//! The broker session lives entirely on the co-processor; these commands
//! configure it, publish, and manage subscriptions. Pushed subscription
//! messages arrive unsolicited as `+MQTTSUBRECV` lines and are picked up
//! by [`CommandEngine::mqtt_poll_message`].

use embedded_hal::delay::DelayNs;
use log::info;

use crate::engine::CommandEngine;
use crate::engine::wifi::split_response_fields;
use crate::error::{CommandError, Result};
use crate::link::Transport;
use crate::link::scanner::{find, parse_decimal};
use crate::time::Clock;

/// Broker session options beyond the user credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqttConnCfg<'a> {
    /// Keep-alive interval in seconds (0 lets the firmware choose).
    pub keepalive: u16,
    pub clean_session: bool,
    pub lwt_topic: &'a str,
    pub lwt_msg: &'a str,
    pub lwt_qos: u8,
    pub lwt_retain: bool,
}

impl Default for MqttConnCfg<'_> {
    fn default() -> Self {
        Self {
            keepalive: 120,
            clean_session: true,
            lwt_topic: "",
            lwt_msg: "",
            lwt_qos: 0,
            lwt_retain: false,
        }
    }
}

/// Broker session state reported by `AT+MQTTCONN?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttState {
    NotInitialized,
    SetUserCfg,
    SetConnCfg,
    Disconnected,
    Established,
    ConnectedNoSub,
    ConnectedSub,
}

impl MqttState {
    fn from_ordinal(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::NotInitialized),
            1 => Some(Self::SetUserCfg),
            2 => Some(Self::SetConnCfg),
            3 => Some(Self::Disconnected),
            4 => Some(Self::Established),
            5 => Some(Self::ConnectedNoSub),
            6 => Some(Self::ConnectedSub),
            _ => None,
        }
    }
}

/// One message pushed by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: heapless::String<128>,
    pub payload: Vec<u8>,
}

impl<T: Transport, C: Clock, D: DelayNs> CommandEngine<T, C, D> {
    // ─── Session configuration ────────────────────────────────────────────

    /// Configure client identity and credentials (`scheme` 1 = plain TCP).
    pub fn mqtt_user_cfg(
        &mut self,
        scheme: u8,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let cmd = format!(
            "AT+MQTTUSERCFG=0,{scheme},\"{client_id}\",\"{username}\",\"{password}\",0,0,\"\""
        );
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn mqtt_username(&mut self, username: &str) -> Result<()> {
        let cmd = format!("AT+MQTTUSERNAME=0,\"{username}\"");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn mqtt_password(&mut self, password: &str) -> Result<()> {
        let cmd = format!("AT+MQTTPASSWORD=0,\"{password}\"");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn mqtt_conn_cfg(&mut self, cfg: &MqttConnCfg<'_>) -> Result<()> {
        let cmd = format!(
            "AT+MQTTCONNCFG=0,{},{},\"{}\",\"{}\",{},{}",
            cfg.keepalive,
            u8::from(!cfg.clean_session),
            cfg.lwt_topic,
            cfg.lwt_msg,
            cfg.lwt_qos,
            u8::from(cfg.lwt_retain),
        );
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    // ─── Broker connection ────────────────────────────────────────────────

    pub fn mqtt_conn(&mut self, host: &str, port: u16, reconnect: bool) -> Result<()> {
        info!("mqtt: connecting to {host}:{port}");
        let cmd = format!("AT+MQTTCONN=0,\"{host}\",{port},{}", u8::from(reconnect));
        self.simple_cmd(&cmd, self.config.connect_timeout_ms)
    }

    /// Query the broker session state.
    pub fn mqtt_conn_info(&mut self) -> Result<MqttState> {
        self.exchange(
            "AT+MQTTCONN?",
            &[b"OK", b"ERROR"],
            self.config.probe_timeout_ms,
        )?;
        let body = self
            .scanner
            .find_between(b"+MQTTCONN:0,", b"\r\n")
            .ok_or(CommandError::Parse)?;
        // +MQTTCONN:0,<state>,<scheme>,"host",port,"path",reconnect
        let state = split_response_fields(body)
            .next()
            .and_then(parse_decimal)
            .ok_or(CommandError::Parse)?;
        MqttState::from_ordinal(state).ok_or(CommandError::Parse.into())
    }

    /// Tear down the broker session and release its resources.
    pub fn mqtt_clean(&mut self) -> Result<()> {
        self.simple_cmd("AT+MQTTCLEAN=0", self.config.probe_timeout_ms)
    }

    // ─── Publish / subscribe ──────────────────────────────────────────────

    pub fn mqtt_pub(&mut self, topic: &str, data: &str, qos: u8, retain: bool) -> Result<()> {
        let cmd = format!(
            "AT+MQTTPUB=0,\"{topic}\",\"{data}\",{qos},{}",
            u8::from(retain)
        );
        self.simple_cmd(&cmd, self.config.send_ack_timeout_ms)
    }

    pub fn mqtt_sub(&mut self, topic: &str, qos: u8) -> Result<()> {
        let cmd = format!("AT+MQTTSUB=0,\"{topic}\",{qos}");
        match self.exchange(
            &cmd,
            &[b"OK", b"ALREADY SUBSCRIBE", b"ERROR"],
            self.config.probe_timeout_ms,
        )? {
            0 | 1 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    pub fn mqtt_unsub(&mut self, topic: &str) -> Result<()> {
        let cmd = format!("AT+MQTTUNSUB=0,\"{topic}\"");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    /// Fetch the active subscription list and stash it for
    /// [`mqtt_sub_next`](Self::mqtt_sub_next).
    pub fn mqtt_sub_begin(&mut self) -> Result<()> {
        if self.exchange(
            "AT+MQTTSUB?",
            &[b"\r\nOK", b"ERROR"],
            self.config.probe_timeout_ms,
        )? != 0
        {
            return Err(CommandError::Rejected.into());
        }
        self.listing.clear();
        self.listing.extend_from_slice(self.scanner.window());
        self.listing_pos = 0;
        Ok(())
    }

    /// Next subscribed topic from the stored listing.
    pub fn mqtt_sub_next(&mut self) -> Result<Option<heapless::String<128>>> {
        let Some(body) = self.next_listing_item(b"+MQTTSUB:", b"\r\n") else {
            return Ok(None);
        };
        // +MQTTSUB:0,<state>,"topic",<qos>
        let topic = split_response_fields(&body)
            .nth(2)
            .ok_or(CommandError::Parse)?;
        let text = core::str::from_utf8(topic).map_err(|_| CommandError::Parse)?;
        let mut out = heapless::String::new();
        out.push_str(text).map_err(|_| CommandError::Parse)?;
        Ok(Some(out))
    }

    // ─── Inbound messages ─────────────────────────────────────────────────

    /// Collect link traffic for `window_ms` and return the first pushed
    /// subscription message found, if any.
    pub fn mqtt_poll_message(&mut self, window_ms: u64) -> Result<Option<MqttMessage>> {
        self.scanner
            .collect_for(&mut self.codec, &self.clock, window_ms)?;
        Ok(parse_sub_recv(self.scanner.window()))
    }
}

/// Parse `+MQTTSUBRECV:<id>,"<topic>",<len>,<payload>` out of raw traffic.
fn parse_sub_recv(window: &[u8]) -> Option<MqttMessage> {
    const MARKER: &[u8] = b"+MQTTSUBRECV:";
    let at = find(window, MARKER)? + MARKER.len();
    let rest = &window[at..];

    // <id>,
    let comma = find(rest, b",")?;
    let rest = &rest[comma + 1..];
    // "<topic>",
    let rest = rest.strip_prefix(b"\"")?;
    let quote = find(rest, b"\"")?;
    let topic_bytes = &rest[..quote];
    let rest = rest[quote + 1..].strip_prefix(b",")?;
    // <len>,
    let comma = find(rest, b",")?;
    let len = parse_decimal(&rest[..comma])? as usize;
    let rest = &rest[comma + 1..];
    // Payload runs for exactly `len` bytes; a short window means the
    // message is truncated and not usable.
    if rest.len() < len {
        return None;
    }

    let text = core::str::from_utf8(topic_bytes).ok()?;
    let mut topic = heapless::String::new();
    topic.push_str(text).ok()?;
    Some(MqttMessage {
        topic,
        payload: rest[..len].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::link::mock::MockLink;
    use crate::time::testing::{FakeClock, NoopDelay};

    fn engine(link: MockLink) -> CommandEngine<MockLink, FakeClock, NoopDelay> {
        CommandEngine::new(link, FakeClock::new(1), NoopDelay, EngineConfig::default())
    }

    #[test]
    fn user_cfg_command_shape() {
        let mut link = MockLink::new();
        link.script_reply(b"\r\nOK\r\n");
        let mut e = engine(link);
        e.mqtt_user_cfg(1, "probe-7", "user", "pass").unwrap();
        assert_eq!(
            e.codec.transport.written_text(),
            "AT+MQTTUSERCFG=0,1,\"probe-7\",\"user\",\"pass\",0,0,\"\"\r\n"
        );
    }

    #[test]
    fn password_uses_its_own_command() {
        let mut link = MockLink::new();
        link.script_reply(b"\r\nOK\r\n");
        let mut e = engine(link);
        e.mqtt_password("hunter2").unwrap();
        assert_eq!(
            e.codec.transport.written_text(),
            "AT+MQTTPASSWORD=0,\"hunter2\"\r\n"
        );
    }

    #[test]
    fn conn_info_reports_state() {
        let mut link = MockLink::new();
        link.script_reply(b"+MQTTCONN:0,4,1,\"10.0.0.9\",1883,\"\",1\r\n\r\nOK\r\n");
        let mut e = engine(link);
        assert_eq!(e.mqtt_conn_info().unwrap(), MqttState::Established);
    }

    #[test]
    fn already_subscribed_is_success() {
        let mut link = MockLink::new();
        link.script_reply(b"ALREADY SUBSCRIBE\r\n\r\nOK\r\n");
        let mut e = engine(link);
        e.mqtt_sub("sensors/#", 1).unwrap();
    }

    #[test]
    fn subscription_listing_walk() {
        let mut link = MockLink::new();
        link.script_reply(
            b"+MQTTSUB:0,1,\"sensors/#\",1\r\n+MQTTSUB:0,1,\"cmd/probe-7\",0\r\n\r\nOK\r\n",
        );
        let mut e = engine(link);
        e.mqtt_sub_begin().unwrap();
        assert_eq!(e.mqtt_sub_next().unwrap().unwrap().as_str(), "sensors/#");
        assert_eq!(e.mqtt_sub_next().unwrap().unwrap().as_str(), "cmd/probe-7");
        assert!(e.mqtt_sub_next().unwrap().is_none());
    }

    #[test]
    fn poll_extracts_pushed_message() {
        let mut link = MockLink::new();
        link.push_data(b"+MQTTSUBRECV:0,\"cmd/probe-7\",5,start\r\n");
        let mut e = engine(link);
        let msg = e.mqtt_poll_message(50).unwrap().unwrap();
        assert_eq!(msg.topic.as_str(), "cmd/probe-7");
        assert_eq!(msg.payload, b"start");
    }

    #[test]
    fn poll_with_quiet_link_returns_none() {
        let mut e = engine(MockLink::new());
        assert!(e.mqtt_poll_message(50).unwrap().is_none());
    }

    #[test]
    fn truncated_push_is_dropped() {
        assert!(parse_sub_recv(b"+MQTTSUBRECV:0,\"t\",10,shor").is_none());
    }

    #[test]
    fn payload_with_commas_survives() {
        let msg = parse_sub_recv(b"+MQTTSUBRECV:0,\"t\",7,a,b,c,d\r\n").unwrap();
        assert_eq!(msg.payload, b"a,b,c,d");
    }
}
