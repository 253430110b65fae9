//! The analyzer module registry: holds every known filesystem analyzer and
//! picks one, either by name or by probing the first sectors of a device.

use std::io::Write;

use crate::blockdev::BlockDevice;
use crate::error::{Error, Result};

pub trait AnalyzerModule {
    fn name(&self) -> &'static str;

    /// Bytes of the header this module needs in order to make a recognition
    /// decision.
    fn header_probe_len(&self) -> usize;

    fn recognize(&self, header: &[u8]) -> bool;

    /// Whether this module needs a mounted filesystem to analyze rather than
    /// being able to work straight off the device.
    fn needs_mounted_fs(&self) -> bool {
        false
    }

    fn analyze(&self, device: &dyn BlockDevice, out: &mut dyn Write) -> Result<()>;
}

#[derive(Default)]
pub struct Registry {
    modules: Vec<Box<dyn AnalyzerModule>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Box<dyn AnalyzerModule>) {
        self.modules.push(module);
    }

    pub fn max_probe_len(&self) -> usize {
        self.modules.iter().map(|m| m.header_probe_len()).max().unwrap_or(0)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&dyn AnalyzerModule> {
        self.modules
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
            .map(|m| m.as_ref())
    }

    /// First module (in registration order) that recognizes `header`.
    pub fn detect(&self, header: &[u8]) -> Option<&dyn AnalyzerModule> {
        self.modules
            .iter()
            .find(|m| m.recognize(&header[..header.len().min(m.header_probe_len())]))
            .map(|m| m.as_ref())
    }

    /// Reads the probe header from `device`, selects a module (by name if
    /// given, else by auto-detection), and runs its analysis.
    pub fn dispatch(
        &self,
        device: &dyn BlockDevice,
        type_name: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<()> {
        let probe_len = self.max_probe_len();
        let mut header = vec![0u8; probe_len];
        device.read_exact_at(0, &mut header)?;

        let module = match type_name {
            Some(name) => self
                .find_by_name(name)
                .ok_or_else(|| Error::Argument(format!("unknown filesystem type: {name}")))?,
            None => self
                .detect(&header)
                .ok_or_else(|| Error::Unsupported("could not recognize filesystem".into()))?,
        };

        if module.needs_mounted_fs() {
            return Err(Error::Unsupported(format!(
                "{} requires a mounted filesystem, which is not implemented",
                module.name()
            )));
        }

        module.analyze(device, out)
    }
}
