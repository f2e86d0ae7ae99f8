use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::paint::BlendMode;

use super::registry::ShaderHandle;
use super::types::{CullMode, DepthCompare, SampleCount, TextureFormat, VertexFormat};

/// Boost-style hash mixing.
#[inline]
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9_7f4a_7c16)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Stable 64-bit hash of a single value.
#[inline]
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Vertex buffer slot as seen by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub format: VertexFormat,
    pub instanced: bool,
}

/// Format and sample count of one target attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentInfo {
    pub format: TextureFormat,
    pub sample_count: SampleCount,
}

/// Every piece of draw state a backend pipeline object depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineKey {
    pub shader: ShaderHandle,
    pub cull_mode: CullMode,
    pub depth_compare: DepthCompare,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: BlendMode,
    /// Index element size in bytes, when an index buffer is bound.
    pub index_size: Option<u32>,
    pub vertex_layouts: Vec<VertexLayout>,
    pub targets: Vec<AttachmentInfo>,
}

impl PipelineKey {
    /// Combined hash of the key fields.
    pub fn hash64(&self) -> u64 {
        let mut h = hash_of(&self.shader);
        h = hash_combine(h, hash_of(&self.cull_mode));
        h = hash_combine(h, hash_of(&self.depth_compare));
        h = hash_combine(h, hash_of(&self.depth_test));
        h = hash_combine(h, hash_of(&self.depth_write));
        h = hash_combine(h, hash_of(&self.blend));

        if let Some(size) = self.index_size {
            h = hash_combine(h, hash_of(&size));
        }

        for layout in &self.vertex_layouts {
            h = hash_combine(h, hash_of(&layout.format));
            h = hash_combine(h, hash_of(&layout.instanced));
        }

        for target in &self.targets {
            h = hash_combine(h, hash_of(&target.format.canonical()));
            h = hash_combine(h, hash_of(&target.sample_count));
        }

        h
    }

    /// Highest sample count across the attachments.
    pub fn sample_count(&self) -> SampleCount {
        self.targets
            .iter()
            .map(|t| t.sample_count)
            .max_by_key(|s| s.count())
            .unwrap_or_default()
    }
}

/// Result of probing the cache.
pub enum Lookup<P> {
    Hit(P),
    Miss,
    /// The hash is taken by a structurally different key.
    Collision { previous: ShaderHandle },
}

struct CachedPipeline<P> {
    key: PipelineKey,
    pipeline: P,
}

/// Pipeline objects keyed by [`PipelineKey::hash64`].
///
/// Entries also keep their full key; a hit requires structural equality, so
/// a hash collision never hands out a pipeline built for different state.
pub struct PipelineCache<P> {
    entries: HashMap<u64, CachedPipeline<P>>,
}

impl<P: Clone> PipelineCache<P> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, hash: u64, key: &PipelineKey) -> Lookup<P> {
        match self.entries.get(&hash) {
            Some(entry) if entry.key == *key => Lookup::Hit(entry.pipeline.clone()),
            Some(entry) => Lookup::Collision { previous: entry.key.shader },
            None => Lookup::Miss,
        }
    }

    /// Stores `pipeline`, returning whatever previously occupied `hash`.
    pub fn insert(&mut self, hash: u64, key: PipelineKey, pipeline: P) -> Option<P> {
        self.entries
            .insert(hash, CachedPipeline { key, pipeline })
            .map(|old| old.pipeline)
    }

    pub fn remove(&mut self, hash: u64) -> Option<P> {
        self.entries.remove(&hash).map(|e| e.pipeline)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        self.entries.drain().map(|(_, e)| e.pipeline)
    }
}

impl<P: Clone> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::{VertexElement, VertexType};

    fn key() -> PipelineKey {
        PipelineKey {
            shader: ShaderHandle::new(0, 0),
            cull_mode: CullMode::None,
            depth_compare: DepthCompare::Less,
            depth_test: false,
            depth_write: false,
            blend: BlendMode::PREMULTIPLY,
            index_size: Some(4),
            vertex_layouts: vec![VertexLayout {
                format: VertexFormat::new(&[VertexElement::new(0, VertexType::Float2, false)]),
                instanced: false,
            }],
            targets: vec![AttachmentInfo {
                format: TextureFormat::Color,
                sample_count: SampleCount::One,
            }],
        }
    }

    // ── hashing ───────────────────────────────────────────────────────────

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(key().hash64(), key().hash64());
    }

    #[test]
    fn every_field_changes_hash() {
        let base = key().hash64();

        let mut k = key();
        k.shader = ShaderHandle::new(1, 0);
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.cull_mode = CullMode::Back;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.depth_compare = DepthCompare::Greater;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.depth_test = true;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.depth_write = true;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.blend = BlendMode::ADD;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.index_size = Some(2);
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.vertex_layouts[0].instanced = true;
        assert_ne!(k.hash64(), base);

        let mut k = key();
        k.targets[0].sample_count = SampleCount::Four;
        assert_ne!(k.hash64(), base);
    }

    #[test]
    fn color_alias_hashes_like_rgba8() {
        let mut k = key();
        k.targets[0].format = TextureFormat::R8G8B8A8;
        assert_eq!(k.hash64(), key().hash64());
    }

    // ── cache ─────────────────────────────────────────────────────────────

    #[test]
    fn hit_requires_structural_match() {
        let mut cache = PipelineCache::new();
        let k = key();
        let h = k.hash64();
        assert!(matches!(cache.lookup(h, &k), Lookup::Miss));

        cache.insert(h, k.clone(), 7u32);
        assert!(matches!(cache.lookup(h, &k), Lookup::Hit(7)));

        // Same hash slot, different state: reported, never served.
        let mut other = key();
        other.shader = ShaderHandle::new(9, 9);
        assert!(matches!(cache.lookup(h, &other), Lookup::Collision { .. }));
    }

    #[test]
    fn remove_and_drain() {
        let mut cache = PipelineCache::new();
        cache.insert(1, key(), 1u32);
        cache.insert(2, key(), 2u32);
        assert_eq!(cache.remove(1), Some(1));
        assert_eq!(cache.remove(1), None);
        let rest: Vec<u32> = cache.drain().collect();
        assert_eq!(rest, vec![2]);
        assert!(cache.is_empty());
    }
}
