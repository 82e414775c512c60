//! Protocol command construction.

use std::fmt;

use crate::codec::encode_hex;

/// Separator placed between the arguments of a verb.
pub const ARGUMENT_SEPARATOR: char = ',';

/// Verb of the interrupt command: the raw `0x03` byte with no verb text.
pub const INTERRUPT_VERB: &str = "\x03";

/// One request to the debug stub.
///
/// Commands are built right before they are sent and dropped once the
/// matching response has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    arguments: Vec<String>,
    separator: char,
}

impl Command {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(verb: impl Into<String>) -> Self {
        Self::with_arguments(verb, Vec::<String>::new())
    }

    /// Creates a command whose arguments are joined with [`ARGUMENT_SEPARATOR`].
    #[must_use]
    pub fn with_arguments<I, S>(verb: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verb: verb.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            separator: ARGUMENT_SEPARATOR,
        }
    }

    #[must_use]
    pub fn set_max_packet_size(size: usize) -> Self {
        Self::with_arguments("QSetMaxPacketSize:", [size.to_string()])
    }

    #[must_use]
    pub fn set_working_dir(path: &str) -> Self {
        Self::with_arguments("QSetWorkingDir:", [path])
    }

    /// `QEnvironmentHexEncoded:` carrying one `KEY=VALUE` entry.
    #[must_use]
    pub fn set_environment(entry: &str) -> Self {
        Self::with_arguments("QEnvironmentHexEncoded:", [encode_hex(entry)])
    }

    /// `A` packet: `len,index,hex` triples, one per argv entry.
    #[must_use]
    pub fn set_argv(argv: &[String]) -> Self {
        let mut arguments = Vec::with_capacity(argv.len() * 3);
        for (index, arg) in argv.iter().enumerate() {
            let encoded = encode_hex(arg);
            arguments.push(encoded.len().to_string());
            arguments.push(index.to_string());
            arguments.push(encoded);
        }
        Self::with_arguments("A", arguments)
    }

    #[must_use]
    pub fn launch_success() -> Self {
        Self::new("qLaunchSuccess")
    }

    #[must_use]
    pub fn detach() -> Self {
        Self::new("D")
    }

    /// `Hc0`: route continue requests to any thread.
    #[must_use]
    pub fn set_thread() -> Self {
        Self::new("Hc0")
    }

    #[must_use]
    pub fn continue_process() -> Self {
        Self::new("c")
    }

    #[must_use]
    pub fn interrupt() -> Self {
        Self::new(INTERRUPT_VERB)
    }

    #[must_use]
    pub fn kill() -> Self {
        Self::new("k")
    }

    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// True for the out-of-band interrupt byte, which transports send unframed.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        self.verb == INTERRUPT_VERB && self.arguments.is_empty()
    }

    /// Wire text of this command, without packet framing.
    #[must_use]
    pub fn encode(&self) -> String {
        if self.arguments.is_empty() {
            return self.verb.clone();
        }

        let separator = self.separator.to_string();
        let mut encoded = self.verb.clone();
        encoded.push_str(&self.arguments.join(&separator));
        encoded
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_interrupt() {
            f.write_str("<interrupt>")
        } else {
            f.write_str(&self.encode())
        }
    }
}
