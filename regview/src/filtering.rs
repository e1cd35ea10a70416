//! Selection of peripherals and registers by name

use regex::Regex;

use crate::{
    error::Error,
    model::{Device, PeripheralDescriptor},
};
use log::info;

/// Which peripherals and registers to keep from the input
#[derive(Default)]
pub struct Filters {
    /// Filter based on register name
    pub(crate) reg: Option<ItemFilter<String>>,
    /// Filter peripherals
    pub(crate) top: Option<ItemFilter<String>>,
}

impl Filters {
    /// Take all peripherals and registers in input
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_filters(
        reg_filter: Option<ItemFilter<String>>,
        periph_filter: Option<ItemFilter<String>>,
    ) -> Self {
        Self {
            reg: reg_filter,
            top: periph_filter,
        }
    }

    /// Remove the peripherals and registers that are not allowed from `device`
    pub(crate) fn apply(&self, device: Device) -> Device {
        let Device { name, peripherals } = device;
        let peripherals = peripherals
            .into_iter()
            .filter(|p| {
                let allowed = self.top.as_ref().map_or(true, |f| f.is_allowed(&p.name));
                if !allowed {
                    info!(
                        "Peripheral {} was not included due to peripheral filters",
                        p.name
                    );
                }
                allowed
            })
            .map(|p| self.apply_reg(p))
            .collect();
        Device::new(name, peripherals)
    }

    fn apply_reg(&self, mut periph: PeripheralDescriptor) -> PeripheralDescriptor {
        if let Some(filter) = &self.reg {
            periph.registers.retain(|r| {
                let allowed = filter.is_allowed(&r.name);
                if !allowed {
                    info!(
                        "Register {}-{} was not included due to register filters",
                        periph.name, r.name
                    );
                }
                allowed
            });
        }
        periph
    }
}

/// What items of type `T` are allowed or not
pub enum ItemFilter<T: PartialEq> {
    List {
        // If set, only the specified items are allowed. If not set, all items are
        // allowed except the ones listed in blocklist.
        allow_list: Option<Vec<T>>,
        // These items are always blocked even if present in `allow_list`
        block_list: Vec<T>,
    },
    Regex {
        // If set, only items matching the regex are allowed
        allow: Option<Regex>,
        // If set, items matching the regex are not allowed
        block: Option<Regex>,
    },
}

impl<T: PartialEq> ItemFilter<T> {
    pub fn list(allow_list: Option<Vec<T>>, block_list: Vec<T>) -> ItemFilter<T> {
        Self::List {
            allow_list,
            block_list,
        }
    }

    pub const fn regex(allow: Option<Regex>, block: Option<Regex>) -> ItemFilter<T> {
        Self::Regex { allow, block }
    }
}

impl ItemFilter<String> {
    /// Compile `allow` and `block` patterns into a regex filter
    pub fn from_patterns(allow: Option<&str>, block: Option<&str>) -> Result<Self, Error> {
        let compile = |pattern: Option<&str>| pattern.map(Regex::new).transpose();
        Ok(Self::regex(compile(allow)?, compile(block)?))
    }
}

impl<T> ItemFilter<T>
where
    T: PartialEq + AsRef<str>,
{
    pub fn is_allowed(&self, value: &str) -> bool {
        match self {
            Self::List {
                allow_list,
                block_list,
            } => {
                // Items in block list are always blocked
                if block_list.iter().any(|b| b.as_ref() == value) {
                    return false;
                }
                allow_list
                    .as_ref()
                    .map_or(true, |al| al.iter().any(|a| a.as_ref() == value))
            }
            Self::Regex { allow, block } => {
                // Items matched by block regex are always blocked
                if block.as_ref().is_some_and(|block| block.is_match(value)) {
                    return false;
                }
                allow.as_ref().map_or(true, |allow| allow.is_match(value))
            }
        }
    }

    pub fn is_blocked(&self, value: &str) -> bool {
        !self.is_allowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Access, RegisterDescriptor, NO_DESCRIPTION};

    fn periph(name: &str, base: u64, regs: &[&str]) -> PeripheralDescriptor {
        PeripheralDescriptor::new(
            name.to_owned(),
            NO_DESCRIPTION.to_owned(),
            base,
            None,
            regs.iter()
                .enumerate()
                .map(|(i, r)| RegisterDescriptor {
                    name: (*r).to_owned(),
                    description: NO_DESCRIPTION.to_owned(),
                    address_offset: 4 * i as u64,
                    access: Access::ReadWrite,
                    fields: vec![],
                })
                .collect(),
        )
    }

    fn device() -> Device {
        Device::new(
            "DEV".to_owned(),
            vec![
                periph("UART0", 0x1000, &["DATA", "STATUS"]),
                periph("UART1", 0x2000, &["DATA", "STATUS"]),
                periph("TIMER", 0x3000, &["LOAD"]),
            ],
        )
    }

    #[test]
    fn list_filter_blocks_before_allowing() {
        let f = ItemFilter::list(
            Some(vec!["UART0".to_owned(), "UART1".to_owned()]),
            vec!["UART1".to_owned()],
        );
        assert!(f.is_allowed("UART0"));
        assert!(f.is_blocked("UART1"));
        assert!(f.is_blocked("TIMER"));
    }

    #[test]
    fn regex_filter_blocks_before_allowing() {
        let f: ItemFilter<String> = ItemFilter::regex(
            Some(Regex::new("^UART").unwrap()),
            Some(Regex::new("1$").unwrap()),
        );
        assert!(f.is_allowed("UART0"));
        assert!(f.is_blocked("UART1"));
        assert!(f.is_blocked("TIMER"));
    }

    #[test]
    fn patterns_compile_into_regex_filter() {
        let f = ItemFilter::from_patterns(Some("^UART"), None).unwrap();
        assert!(f.is_allowed("UART1"));
        assert!(f.is_blocked("TIMER"));
        assert!(matches!(
            ItemFilter::from_patterns(None, Some("(")),
            Err(Error::Regex(_))
        ));
    }

    #[test]
    fn filters_apply_to_peripherals_and_registers() {
        let filters = Filters::from_filters(
            Some(ItemFilter::list(None, vec!["STATUS".to_owned()])),
            Some(ItemFilter::regex(Some(Regex::new("^UART").unwrap()), None)),
        );
        let dev = filters.apply(device());
        let names = dev
            .peripherals
            .iter()
            .map(|p| (p.name.as_str(), p.registers.len()))
            .collect::<Vec<_>>();
        assert_eq!(names, [("UART0", 1), ("UART1", 1)]);

        assert_eq!(Filters::all().apply(device()), device());
    }
}
