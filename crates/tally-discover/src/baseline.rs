//! Per-subnet baseline of known addresses.
//!
//! Built once per subnet at the start of a pass. Every entry starts out
//! unconfirmed (Offline); discovery moves entries to Online through
//! [`Baseline::confirm`] and [`Baseline::record_insert`] only.

use std::collections::BTreeMap;

use tally_core::address::Canonical;
use tally_core::{AddressId, AddressRecord, AddressStatus, MacAddress, SubnetId};

/// Working state for one address during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineEntry {
    pub id: AddressId,
    /// Status stored before this pass.
    pub previous_status: AddressStatus,
    /// Physical address stored before this pass.
    pub previous_mac: Option<MacAddress>,
    pub status: AddressStatus,
    pub mac: Option<MacAddress>,
    /// Created during this pass.
    pub inserted: bool,
}

impl BaselineEntry {
    fn unconfirmed(record: &AddressRecord) -> Self {
        Self {
            id: record.id,
            previous_status: record.status,
            previous_mac: record.mac,
            status: AddressStatus::Offline,
            mac: record.mac,
            inserted: false,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == AddressStatus::Online
    }
}

/// How a discovered in-subnet address relates to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Existing(AddressId),
    New,
}

#[derive(Debug, Clone)]
pub struct Baseline {
    entries: BTreeMap<Canonical, BaselineEntry>,
}

impl Baseline {
    pub fn from_records(subnet_id: SubnetId, records: &[AddressRecord]) -> Self {
        let entries = records
            .iter()
            .filter(|r| r.subnet_id == subnet_id)
            .map(|r| (r.address, BaselineEntry::unconfirmed(r)))
            .collect();

        Self { entries }
    }

    /// Add a stored record that was not present when the baseline was built.
    pub fn adopt(&mut self, record: &AddressRecord) {
        self.entries
            .entry(record.address)
            .or_insert_with(|| BaselineEntry::unconfirmed(record));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, address: Canonical) -> Option<&BaselineEntry> {
        self.entries.get(&address)
    }

    pub fn classify(&self, address: Canonical) -> Classification {
        match self.entries.get(&address) {
            Some(entry) => Classification::Existing(entry.id),
            None => Classification::New,
        }
    }

    /// Mark a known address Online. Later confirmations overwrite the
    /// physical address of earlier ones.
    pub fn confirm(&mut self, address: Canonical, mac: Option<MacAddress>) {
        if let Some(entry) = self.entries.get_mut(&address) {
            entry.status = AddressStatus::Online;
            if mac.is_some() {
                entry.mac = mac;
            }
        }
    }

    /// Track a record inserted during this pass so repeat sightings confirm
    /// it instead of inserting again.
    pub fn record_insert(&mut self, address: Canonical, id: AddressId, mac: Option<MacAddress>) {
        self.entries.insert(
            address,
            BaselineEntry {
                id,
                previous_status: AddressStatus::Offline,
                previous_mac: None,
                status: AddressStatus::Online,
                mac,
                inserted: true,
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (Canonical, &BaselineEntry)> {
        self.entries.iter().map(|(addr, entry)| (*addr, entry))
    }

    /// Addresses not confirmed so far, in ascending order.
    pub fn unconfirmed(&self) -> impl Iterator<Item = Canonical> + '_ {
        self.iter()
            .filter(|(_, e)| !e.is_confirmed())
            .map(|(addr, _)| addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::address::to_canonical;

    fn record(id: u64, ip: &str, status: AddressStatus) -> AddressRecord {
        AddressRecord {
            id: AddressId(id),
            subnet_id: SubnetId(1),
            address: to_canonical(ip).unwrap(),
            mac: None,
            hostname: None,
            status,
            last_seen: None,
        }
    }

    #[test]
    fn test_baseline_starts_offline() {
        let baseline = Baseline::from_records(
            SubnetId(1),
            &[
                record(1, "10.0.0.5", AddressStatus::Online),
                record(2, "10.0.0.6", AddressStatus::Reserved),
            ],
        );

        assert_eq!(baseline.len(), 2);
        for (_, entry) in baseline.iter() {
            assert_eq!(entry.status, AddressStatus::Offline);
        }
        let a = to_canonical("10.0.0.5").unwrap();
        assert_eq!(baseline.get(a).unwrap().previous_status, AddressStatus::Online);
    }

    #[test]
    fn test_classify_and_confirm() {
        let mut baseline =
            Baseline::from_records(SubnetId(1), &[record(1, "10.0.0.5", AddressStatus::Offline)]);
        let a = to_canonical("10.0.0.5").unwrap();
        let b = to_canonical("10.0.0.9").unwrap();

        assert_eq!(baseline.classify(a), Classification::Existing(AddressId(1)));
        assert_eq!(baseline.classify(b), Classification::New);

        let first: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        let second: MacAddress = "00:00:00:00:00:02".parse().unwrap();
        baseline.confirm(a, Some(first));
        baseline.confirm(a, Some(second));
        baseline.confirm(a, None);
        assert_eq!(baseline.get(a).unwrap().mac, Some(second));
        assert!(baseline.get(a).unwrap().is_confirmed());

        baseline.record_insert(b, AddressId(2), None);
        assert_eq!(baseline.classify(b), Classification::Existing(AddressId(2)));
        assert_eq!(baseline.unconfirmed().count(), 0);
    }

    #[test]
    fn test_unconfirmed_lists_missing_hosts() {
        let mut baseline = Baseline::from_records(
            SubnetId(1),
            &[
                record(1, "10.0.0.5", AddressStatus::Online),
                record(2, "10.0.0.6", AddressStatus::Online),
            ],
        );
        baseline.confirm(to_canonical("10.0.0.5").unwrap(), None);

        let missing: Vec<Canonical> = baseline.unconfirmed().collect();
        assert_eq!(missing, vec![to_canonical("10.0.0.6").unwrap()]);
    }
}
