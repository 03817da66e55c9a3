//! Access to a `.cubex` archive: a tar of `anchor.xml` plus one
//! `<id>.index`/`<id>.data` pair per metric with recorded data.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::error::{CubexError, Result};
use crate::metric_values::{Conversion, MetricValues, extract_metric_values};
use crate::model::{CallNode, Location, Metric, PreOrder, Profile, Region};
use crate::parsers::parse_anchor_auto;
use crate::values::CubeValue;

const BLOCK_SIZE: usize = 512;
const ANCHOR: &str = "anchor.xml";

/// Per-call options for [`CubexArchive::metric_values_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Keep extracted values for later calls.
    pub cache: bool,
    /// Keep UINT64 values above [`crate::values::UINT64_DOUBLE_LIMIT`]
    /// instead of reading them as zero.
    pub allow_full_uint64_values: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            cache: true,
            allow_full_uint64_values: false,
        }
    }
}

/// An opened profile. Single-threaded: the value cache uses interior
/// mutability so lookups can be mixed freely with metric borrows.
#[derive(Debug)]
pub struct CubexArchive {
    profile: Profile,
    members: HashMap<String, Vec<u8>>,
    options: ArchiveOptions,
    cache: RefCell<HashMap<(u64, bool), Rc<MetricValues>>>,
}

impl CubexArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("opening {}", path.display());
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let mut bytes = bytes.into();
        repair_checksums(&mut bytes);
        let members = read_members(&bytes)?;
        let anchor = members
            .get(ANCHOR)
            .ok_or_else(|| CubexError::MissingMember(ANCHOR.to_string()))?;
        let profile = parse_anchor_auto(anchor)?;
        tracing::debug!(
            "archive: {} members, {} metrics, {} call nodes",
            members.len(),
            profile.all_metrics().len(),
            profile.all_cnodes().count()
        );
        Ok(Self {
            profile,
            members,
            options: ArchiveOptions::default(),
            cache: RefCell::default(),
        })
    }

    /// Replace the defaults used by [`metric_values`](Self::metric_values).
    pub fn with_options(mut self, options: ArchiveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Member names, without any leading `./`.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn metric_values(&self, metric: &Metric) -> Result<Rc<MetricValues>> {
        self.metric_values_with(metric, self.options)
    }

    /// Extract (or fetch from cache) the values of `metric`.
    ///
    /// Fails with [`CubexError::MissingMetric`] when the archive has no
    /// index or no data member for the metric.
    pub fn metric_values_with(&self, metric: &Metric, options: ArchiveOptions) -> Result<Rc<MetricValues>> {
        let key = (metric.id, options.allow_full_uint64_values);
        if let Some(values) = self.cache.borrow().get(&key) {
            tracing::debug!("metric {}: cache hit", metric.name);
            return Ok(Rc::clone(values));
        }

        let missing = || CubexError::MissingMetric {
            metric: metric.name.clone(),
        };
        let index = self.members.get(&format!("{}.index", metric.id)).ok_or_else(missing)?;
        let data = self.members.get(&format!("{}.data", metric.id)).ok_or_else(missing)?;

        let values = extract_metric_values(metric, index, data, options.allow_full_uint64_values)?;
        let expected = self.profile.num_locations();
        if values.num_locations() != expected {
            return Err(CubexError::LocationCountMismatch {
                metric: metric.name.clone(),
                expected,
                found: values.num_locations(),
            });
        }

        let values = Rc::new(values);
        if options.cache {
            self.cache.borrow_mut().insert(key, Rc::clone(&values));
        }
        Ok(values)
    }

    /// Values of one call node, looked up by id.
    pub fn cnode_values(&self, metric: &Metric, cnode_id: u64, conversion: Conversion) -> Result<Vec<CubeValue>> {
        let cnode = self.cnode(cnode_id).ok_or(CubexError::UnknownCallNode(cnode_id))?;
        Ok(self.metric_values(metric)?.cnode_values(cnode, conversion))
    }

    pub fn cached_metrics(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Drop cached values and the archive contents.
    pub fn close(self) {
        self.cache.borrow_mut().clear();
        tracing::debug!("closed archive with {} members", self.members.len());
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.profile.attrs
    }

    pub fn metrics(&self) -> &[Metric] {
        self.profile.metrics()
    }

    pub fn all_metrics(&self) -> Vec<&Metric> {
        self.profile.all_metrics()
    }

    pub fn metric_by_name(&self, name: &str) -> Option<&Metric> {
        self.profile.metric_by_name(name)
    }

    pub fn region(&self, cnode: &CallNode) -> Option<&Region> {
        self.profile.region(cnode)
    }

    pub fn region_by_name(&self, name: &str) -> Option<&Region> {
        self.profile.region_by_name(name)
    }

    pub fn cnode(&self, id: u64) -> Option<&CallNode> {
        self.profile.cnode(id)
    }

    pub fn root_cnodes(&self) -> &[CallNode] {
        self.profile.root_cnodes()
    }

    pub fn all_cnodes(&self) -> PreOrder<'_> {
        self.profile.all_cnodes()
    }

    pub fn cnodes_for_region(&self, region_id: u64) -> Vec<&CallNode> {
        self.profile.cnodes_for_region(region_id)
    }

    pub fn locations(&self) -> Vec<&Location> {
        self.profile.locations()
    }

    pub fn calltree(&self) -> String {
        self.profile.calltree()
    }
}

/// Rewrite tar header checksums in place so the reader accepts them.
///
/// Some CUBE writers store checksums that match neither the unsigned nor the
/// signed byte sum. Their archives are otherwise intact.
fn repair_checksums(bytes: &mut [u8]) {
    let mut offset = 0;
    while offset + BLOCK_SIZE <= bytes.len() {
        let block = &mut bytes[offset..offset + BLOCK_SIZE];
        if block.iter().all(|&b| b == 0) {
            break;
        }

        let mut header = tar::Header::new_old();
        header.as_mut_bytes().copy_from_slice(block);
        let (unsigned, signed) = header_sums(header.as_bytes());
        let stored = header.cksum().ok();
        if stored != Some(unsigned) {
            if stored.map(i64::from) != Some(signed) {
                tracing::warn!(
                    "invalid checksum in tar header at offset {offset} (stored {stored:?}, computed {unsigned}); proceeding without checksum verification"
                );
            }
            header.set_cksum();
            block.copy_from_slice(header.as_bytes());
        }

        let Ok(size) = header.entry_size() else {
            break;
        };
        let Ok(size) = usize::try_from(size) else {
            break;
        };
        offset += BLOCK_SIZE + size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    }
}

/// Unsigned and signed byte sums of a header, checksum field counted as spaces.
fn header_sums(header: &[u8; BLOCK_SIZE]) -> (u32, i64) {
    let (mut unsigned, mut signed) = (0u32, 0i64);
    for (i, &b) in header.iter().enumerate() {
        let b = if (148..156).contains(&i) { b' ' } else { b };
        unsigned += u32::from(b);
        signed += i64::from(b as i8);
    }
    (unsigned, signed)
}

fn read_members(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(bytes);
    let mut members = HashMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let name = path.strip_prefix("./").unwrap_or(&path).to_string();
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|source| CubexError::Member {
                member: name.clone(),
                source,
            })?;
        tracing::debug!("member {name}: {} bytes", contents.len());
        members.insert(name, contents);
    }
    Ok(members)
}
