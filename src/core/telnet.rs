//! Minimal telnet framing
//!
//! The game server speaks telnet. We refuse every option it offers, strip
//! command sequences out of the data stream, and escape outbound 0xFF.

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum FilterState {
    #[default]
    Data,
    Iac,
    /// Waiting for the option byte after WILL/WONT/DO/DONT
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Stateful inbound filter; sequences may be split across reads.
#[derive(Default)]
pub struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process inbound bytes. Returns the game data and the negotiation
    /// replies that must be written back to the server.
    pub fn process(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match self.state {
                FilterState::Data => {
                    if byte == IAC {
                        FilterState::Iac
                    } else {
                        data.push(byte);
                        FilterState::Data
                    }
                }
                FilterState::Iac => match byte {
                    IAC => {
                        data.push(IAC);
                        FilterState::Data
                    }
                    WILL | WONT | DO | DONT => FilterState::Negotiate(byte),
                    SB => FilterState::Subnegotiation,
                    // NOP, GA and friends carry no payload
                    _ => FilterState::Data,
                },
                FilterState::Negotiate(verb) => {
                    match verb {
                        DO => replies.extend_from_slice(&[IAC, WONT, byte]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, byte]),
                        // WONT/DONT need no answer
                        _ => {}
                    }
                    FilterState::Data
                }
                FilterState::Subnegotiation => {
                    if byte == IAC {
                        FilterState::SubnegotiationIac
                    } else {
                        FilterState::Subnegotiation
                    }
                }
                FilterState::SubnegotiationIac => {
                    if byte == SE {
                        FilterState::Data
                    } else {
                        FilterState::Subnegotiation
                    }
                }
            };
        }

        (data, replies)
    }
}

/// Escape 0xFF in outbound data
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            out.push(IAC);
        }
        out.push(byte);
    }
    out
}
