use std::collections::HashMap;

use crate::bmd::types::Mesh;
use crate::texture::{AlphaThresholds, LegacyHint, ResolvedTexture, TextureResolver};

/// State shared by every mesh of one file's conversion. Texture lookups are
/// memoized here and dropped together with the context.
pub struct ConversionContext<'a> {
    resolver: &'a dyn TextureResolver,
    alpha: AlphaThresholds,
    legacy_hint: Option<LegacyHint>,
    resolved: HashMap<String, Option<ResolvedTexture>>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(resolver: &'a dyn TextureResolver) -> Self {
        Self {
            resolver,
            alpha: AlphaThresholds::default(),
            legacy_hint: None,
            resolved: HashMap::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: AlphaThresholds) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_legacy_hint(mut self, hint: Option<LegacyHint>) -> Self {
        self.legacy_hint = hint;
        self
    }

    pub fn alpha(&self) -> &AlphaThresholds {
        &self.alpha
    }

    pub fn legacy_hint(&self) -> Option<LegacyHint> {
        self.legacy_hint
    }

    pub fn embeds_textures(&self) -> bool {
        self.resolver.embeds_textures()
    }

    fn resolve(&mut self, texture_name: &str) -> Option<ResolvedTexture> {
        let resolver = self.resolver;
        self.resolved
            .entry(texture_name.to_string())
            .or_insert_with(|| resolver.resolve(texture_name))
            .clone()
    }

    /// Texture for `meshes[mesh_index]`. The mesh's texture slot may point at
    /// another mesh's texture name, which is tried first. The first candidate
    /// found on disk wins; otherwise the first unresolved one is returned.
    pub fn resolve_mesh_texture(
        &mut self,
        meshes: &[Mesh],
        mesh_index: usize,
    ) -> Option<ResolvedTexture> {
        let mesh = meshes.get(mesh_index)?;

        let mut candidates: Vec<&str> = Vec::with_capacity(2);
        if let Some(aliased) = usize::try_from(mesh.texture_slot)
            .ok()
            .and_then(|slot| meshes.get(slot))
        {
            candidates.push(&aliased.texture_name);
        }
        candidates.push(&mesh.texture_name);

        let mut fallback = None;
        for name in candidates {
            let Some(resolved) = self.resolve(name) else {
                continue;
            };
            if resolved.found_on_disk {
                return Some(resolved);
            }
            fallback.get_or_insert(resolved);
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{AlphaProfile, NameOnlyResolver};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Finds only names starting with `disk_` and counts lookups.
    #[derive(Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl TextureResolver for CountingResolver {
        fn resolve(&self, texture_name: &str) -> Option<ResolvedTexture> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if texture_name.is_empty() {
                return None;
            }
            Some(ResolvedTexture {
                uri: format!("{}.png", texture_name),
                bytes: None,
                found_on_disk: texture_name.starts_with("disk_"),
                alpha: AlphaProfile::opaque(),
            })
        }

        fn embeds_textures(&self) -> bool {
            true
        }
    }

    fn mesh(texture_slot: i16, texture_name: &str) -> Mesh {
        Mesh {
            texture_slot,
            texture_name: texture_name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_slot_indirection_prefers_aliased_texture() {
        let resolver = CountingResolver::default();
        let mut ctx = ConversionContext::new(&resolver);
        let meshes = vec![mesh(0, "disk_body"), mesh(0, "disk_arm")];

        let resolved = ctx.resolve_mesh_texture(&meshes, 1).unwrap();
        assert_eq!(resolved.uri, "disk_body.png");
    }

    #[test]
    fn test_found_candidate_beats_earlier_missing_one() {
        let resolver = CountingResolver::default();
        let mut ctx = ConversionContext::new(&resolver);
        let meshes = vec![mesh(1, "missing"), mesh(-1, "disk_self")];

        // slot 1 aliases "disk_self", which exists
        assert_eq!(ctx.resolve_mesh_texture(&meshes, 0).unwrap().uri, "disk_self.png");
        // slot -1 has no alias; the mesh's own name is used
        assert_eq!(ctx.resolve_mesh_texture(&meshes, 1).unwrap().uri, "disk_self.png");
    }

    #[test]
    fn test_unresolved_falls_back_to_first_candidate() {
        let resolver = CountingResolver::default();
        let mut ctx = ConversionContext::new(&resolver);
        let meshes = vec![mesh(1, "own"), mesh(5, "alias")];

        let resolved = ctx.resolve_mesh_texture(&meshes, 0).unwrap();
        assert_eq!(resolved.uri, "alias.png");
        assert!(!resolved.found_on_disk);
    }

    #[test]
    fn test_lookups_are_cached_per_context() {
        let resolver = CountingResolver::default();
        let meshes = vec![mesh(0, "disk_a"), mesh(0, "disk_b")];
        {
            let mut ctx = ConversionContext::new(&resolver);
            ctx.resolve_mesh_texture(&meshes, 0);
            ctx.resolve_mesh_texture(&meshes, 1);
            ctx.resolve_mesh_texture(&meshes, 1);
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        let mut fresh = ConversionContext::new(&resolver);
        fresh.resolve_mesh_texture(&meshes, 0);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_candidates() {
        let mut ctx = ConversionContext::new(&NameOnlyResolver);
        assert!(ctx.resolve_mesh_texture(&[mesh(-1, "")], 0).is_none());
        assert!(ctx.resolve_mesh_texture(&[], 0).is_none());
        assert!(!ctx.embeds_textures());
    }
}
