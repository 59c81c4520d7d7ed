// SPDX-License-Identifier: Apache-2.0

//! The target-evaluation driver (spec §4.7): resolves a repository's
//! workspace root (C5), reads its target file (C4), looks up and runs a
//! rule (this crate's `rule`/`builtin`), and recursively resolves
//! dependencies through the async demand-driven evaluator (C3).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use forge_git::{GitRepo, GitTreeEntry};
use forge_model::{
    ArtifactDescription, AsyncMap, EntityName, NamedTarget, ObjectType, ProduceCtx, ReferenceType,
};
use forge_resolve::config::{RepositoriesFile, RepositoryEntry, RepositorySpec};
use forge_resolve::graph::repository_key;
use forge_resolve::precomputed::{tree_structure_digest, ComputedRootEvaluator};
use serde_json::Value;

use crate::cache_key::{AnalysisKey, TargetCacheKey};
use crate::error::{EvalError, EvalResult};
use crate::rule::{AnalysisResult, Rule, TargetContext, TargetDecl};
use crate::target_file::{parse_target_file, read_target_file, TargetFileSource};
use crate::{builtin, config as econfig};

/// Step 1's outcome for one repository: either a tree to read module files
/// out of, or confirmation that this repository has no local content (a
/// served repository the caller has not fetched).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceRoot {
    Present(String),
    Absent,
}

/// Materialises a content-fixed repository root (`Git`/`Archive`/`Zip`/
/// `File`/`Distdir`/`GitTree`) into a tree in the shared ODB. Actually
/// fetching remote content — network I/O, mirror fallback, checksum
/// verification — is the content cache's job (C9); this crate only
/// defines the seam it needs, the same way `forge-resolve` defines
/// [`ComputedRootEvaluator`] as a seam into this crate.
pub trait RootMaterializer: Send + Sync {
    fn materialize(
        &self,
        name: &str,
        entry: &RepositoryEntry,
        spec: &RepositorySpec,
    ) -> EvalResult<WorkspaceRoot>;
}

/// A fully-analysed target (spec §4.7 step 3), keyed in the analysis cache
/// by [`AnalysisKey`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluatedTarget {
    pub analysis: AnalysisResult,
}

impl EvaluatedTarget {
    /// The target's single unambiguous output: the artifact staged at
    /// `"."`, or the sole entry if the whole stage is one path. Used by
    /// dependency resolution and by computed-root evaluation, both of
    /// which need one artifact to stand for "this target's result".
    pub fn default_artifact(&self) -> Option<&ArtifactDescription> {
        if let Some(artifact) = self.analysis.artifact_stage.get(".") {
            return Some(artifact);
        }
        if self.analysis.artifact_stage.len() == 1 {
            return self.analysis.artifact_stage.values().next();
        }
        None
    }
}

struct Shared {
    repo: GitRepo,
    repositories: RepositoriesFile,
    materializer: Arc<dyn RootMaterializer>,
    target_file_source: Option<Arc<dyn TargetFileSource>>,
    roots: Mutex<HashMap<String, WorkspaceRoot>>,
    /// `AnalysisKey` only carries a config *hash* (`serde_json::Value` has
    /// no `Hash` impl, and the key needs one), so the actual config JSON a
    /// rule might want to inspect is threaded through here instead, keyed
    /// by that same hash. Populated once per top-level `evaluate_named`/
    /// `evaluate_computed_root` call; every dependency demanded underneath
    /// it reuses the same hash, so it is never recorded twice.
    configs: Mutex<HashMap<String, Value>>,
}

impl Shared {
    fn record_config(&self, hash: String, config: Value) {
        self.configs.lock().expect("config cache mutex poisoned").entry(hash).or_insert(config);
    }

    fn config_for(&self, hash: &str) -> Value {
        self.configs
            .lock()
            .expect("config cache mutex poisoned")
            .get(hash)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn entry(&self, repository: &str) -> EvalResult<&RepositoryEntry> {
        self.repositories
            .get(repository)
            .ok_or_else(|| EvalError::Other(format!("unknown repository {repository:?}")))
    }

    fn spec(&self, repository: &str) -> EvalResult<&RepositorySpec> {
        self.entry(repository)?
            .repository
            .0
            .as_ref()
            .ok_or_else(|| EvalError::Other(format!("repository {repository:?} has no repository spec")))
    }

    /// Step 1: resolves (and memoises) a repository's workspace root.
    /// `Computed` roots are handled one level up, by whichever `Evaluator`
    /// owns this `Shared` — resolving them recurses into full target
    /// evaluation, which this function must not do reentrantly against its
    /// own pool.
    fn resolve_root(&self, repository: &str) -> EvalResult<WorkspaceRoot> {
        if let Some(cached) = self.roots.lock().expect("root cache mutex poisoned").get(repository) {
            return Ok(cached.clone());
        }
        let entry = self.entry(repository)?;
        let spec = self.spec(repository)?;
        let root = match spec {
            RepositorySpec::TreeStructure { repository: base } => match self.resolve_root(base)? {
                WorkspaceRoot::Present(tree_id) => {
                    let digest = tree_structure_digest(&self.repo, &tree_id)
                        .map_err(|e| EvalError::Other(e.to_string()))?;
                    WorkspaceRoot::Present(digest)
                }
                WorkspaceRoot::Absent => WorkspaceRoot::Absent,
            },
            RepositorySpec::Computed { .. } => {
                return Err(EvalError::Other(format!(
                    "repository {repository:?} is a computed root; resolve it via evaluate_computed_root first"
                )))
            }
            _ => self.materializer.materialize(repository, entry, spec)?,
        };
        self.roots
            .lock()
            .expect("root cache mutex poisoned")
            .insert(repository.to_string(), root.clone());
        Ok(root)
    }

    fn set_root(&self, repository: &str, root: WorkspaceRoot) {
        self.roots
            .lock()
            .expect("root cache mutex poisoned")
            .insert(repository.to_string(), root);
    }

    fn read_decl(&self, target: &NamedTarget) -> EvalResult<Option<TargetDecl>> {
        let entry = self.entry(&target.repository)?;
        let file_name = entry.target_file_name();
        let root = self.resolve_root(&target.repository)?;
        let bytes = match root {
            WorkspaceRoot::Present(tree_id) => {
                read_target_file(&self.repo, &tree_id, &target.module, file_name)?
            }
            WorkspaceRoot::Absent => None,
        };
        let bytes = match bytes {
            Some(bytes) => Some(bytes),
            None => match &self.target_file_source {
                Some(source) => source.fetch_target_file(&target.repository, &target.module, file_name)?,
                None => None,
            },
        };
        let Some(bytes) = bytes else { return Ok(None) };
        let decls = parse_target_file(&target.repository, &target.module, &bytes)?;
        Ok(decls.get(&target.name).cloned())
    }

    /// Step 5: a reference with no declared target is a source file at the
    /// repository-relative path the reference names, not an error. Its
    /// artifact is a `Local` artifact; nothing is read here, materialising
    /// the bytes is deferred to whoever stages this target's output.
    fn source_file_target(&self, target: &NamedTarget) -> EvaluatedTarget {
        let path = if target.module.is_empty() {
            target.name.clone()
        } else {
            format!("{}/{}", target.module, target.name)
        };
        let mut analysis = AnalysisResult::default();
        analysis.artifact_stage.insert(
            ".".to_string(),
            ArtifactDescription::Local {
                path,
                repository: target.repository.clone(),
            },
        );
        EvaluatedTarget { analysis }
    }
}

/// Parses a dependency-reference string relative to the target declaring
/// it (spec §4.7 step 3): `"@repo//module:name"` is fully qualified,
/// `"//module:name"` stays in the declaring target's repository, `":name"`
/// stays in the declaring target's module, and a bare `"name"` is
/// shorthand for `":name"`.
pub fn parse_ref(repository: &str, module: &str, raw: &str) -> NamedTarget {
    let (repository, rest) = if let Some(stripped) = raw.strip_prefix('@') {
        match stripped.split_once("//") {
            Some((repo, rest)) => (repo.to_string(), rest),
            None => (repository.to_string(), stripped),
        }
    } else {
        (repository.to_string(), raw)
    };

    let (module, name) = if let Some(stripped) = rest.strip_prefix("//") {
        match stripped.split_once(':') {
            Some((m, n)) => (m.to_string(), n.to_string()),
            None => (stripped.to_string(), stripped.rsplit('/').next().unwrap_or(stripped).to_string()),
        }
    } else if let Some(name) = rest.strip_prefix(':') {
        (module.to_string(), name.to_string())
    } else {
        (module.to_string(), rest.to_string())
    };

    NamedTarget::new(repository, module, name, ReferenceType::Target)
}

fn cycle_error(chain: &[AnalysisKey]) -> EvalError {
    EvalError::Other(format!(
        "dependency cycle: {}",
        chain
            .iter()
            .map(|k| k.entity.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    ))
}

fn build_map(shared: Arc<Shared>, jobs: usize) -> anyhow::Result<AsyncMap<AnalysisKey, EvaluatedTarget, EvalError>> {
    AsyncMap::new(jobs, move |ctx| produce(Arc::clone(&shared), ctx), cycle_error)
}

/// Steps 2-5 of spec §4.7, run once per demanded [`AnalysisKey`]: reads the
/// declaring target file, looks up its rule, recursively resolves every
/// dependency reference the rule declares, then invokes the rule.
fn produce(shared: Arc<Shared>, ctx: ProduceCtx<AnalysisKey, EvaluatedTarget, EvalError>) {
    let EntityName::Named(target) = ctx.key().entity.clone() else {
        ctx.fail(EvalError::Other(
            "anonymous targets are produced by their declaring rule, not demanded directly".to_string(),
        ));
        return;
    };

    let decl = match shared.read_decl(&target) {
        Ok(Some(decl)) => decl,
        Ok(None) => {
            if target.reference_type == ReferenceType::File {
                ctx.set(shared.source_file_target(&target));
            } else {
                ctx.fail(EvalError::TargetNotFound(target.to_string()));
            }
            return;
        }
        Err(e) => {
            ctx.fail(e);
            return;
        }
    };

    let rule = match builtin::lookup(&decl.rule) {
        Some(rule) => rule,
        None => {
            ctx.fail(EvalError::UnknownRule {
                target: target.to_string(),
                rule: decl.rule.clone(),
            });
            return;
        }
    };

    let refs = match rule.dependency_refs(&decl.fields) {
        Ok(refs) => refs,
        Err(e) => {
            ctx.fail(e);
            return;
        }
    };
    let effective_config = ctx.key().effective_config_hash.clone();
    let dep_keys: Vec<AnalysisKey> = refs
        .iter()
        .map(|raw| {
            let dep_target = parse_ref(&target.repository, &target.module, raw);
            AnalysisKey {
                entity: EntityName::Named(dep_target),
                effective_config_hash: effective_config.clone(),
            }
        })
        .collect();

    let config_hash = ctx.key().effective_config_hash.clone();
    ctx.subcall(dep_keys, move |ctx, results| {
        let mut resolved_inputs = BTreeMap::new();
        for (raw, evaluated) in refs.iter().zip(results.into_iter()) {
            let artifact = match evaluated.default_artifact() {
                Some(artifact) => artifact.clone(),
                None => {
                    ctx.fail(EvalError::InvalidTarget {
                        target: target.to_string(),
                        message: format!("dependency {raw:?} has no single default artifact"),
                    });
                    return;
                }
            };
            resolved_inputs.insert(raw.clone(), artifact);
        }

        let effective_config = shared.config_for(&config_hash);
        let target_ctx = TargetContext {
            repository: &target.repository,
            module: &target.module,
            decl: &decl,
            effective_config: &effective_config,
            resolved_inputs: &resolved_inputs,
        };
        match rule.evaluate(&target_ctx) {
            Ok(analysis) => ctx.set(EvaluatedTarget { analysis }),
            Err(e) => ctx.fail(e),
        }
    });
}

/// Ties C5 (repository resolution), C4 (the Git object layer) and this
/// crate's rule evaluation into one demand-driven analysis cache.
pub struct Evaluator {
    shared: Arc<Shared>,
    map: AsyncMap<AnalysisKey, EvaluatedTarget, EvalError>,
    jobs: usize,
}

impl Evaluator {
    pub fn new(
        repo: GitRepo,
        repositories: RepositoriesFile,
        materializer: Arc<dyn RootMaterializer>,
        target_file_source: Option<Arc<dyn TargetFileSource>>,
        jobs: usize,
    ) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            repo,
            repositories,
            materializer,
            target_file_source,
            roots: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        });
        let map = build_map(Arc::clone(&shared), jobs)?;
        Ok(Self { shared, map, jobs })
    }

    /// Evaluates one named target, blocking the calling thread until it
    /// (and everything it transitively depends on) resolves. `config`
    /// overlays the target's declared defaults (spec §4.7 step 4
    /// supplement) before being folded into the cache key.
    pub fn evaluate_named(&self, target: &NamedTarget, config: &Value) -> EvalResult<EvaluatedTarget> {
        let effective = econfig::effective_config(&Value::Null, config);
        let key = AnalysisKey::new(EntityName::Named(target.clone()), &effective);
        self.shared.record_config(key.effective_config_hash.clone(), effective);
        self.map.run(vec![key]).remove(0)
    }

    /// Step 6's export-target cache key for a target under `config`; `None`
    /// if the repository's key is undefined (a transitive dependency is
    /// not content-fixed, so there is nothing stable to key a persistent
    /// cache entry on — spec §4.7: "entity-identity-independent").
    pub fn export_cache_key(
        &self,
        repository: &str,
        target_name: &str,
        config: &Value,
    ) -> EvalResult<Option<TargetCacheKey>> {
        let effective = econfig::effective_config(&Value::Null, config);
        let key =
            repository_key(&self.shared.repositories, repository).map_err(|e| EvalError::Other(e.to_string()))?;
        Ok(key.map(|k| TargetCacheKey::new(k, target_name, &effective)))
    }

    /// Lets a caller (typically `forge-cli` bootstrapping a run) record a
    /// repository's root once it has been fetched out-of-band, instead of
    /// going through [`RootMaterializer`] — used for the repository the
    /// user is actually standing in, whose root is simply "whatever is
    /// checked out right now".
    pub fn seed_root(&self, repository: &str, root: WorkspaceRoot) {
        self.shared.set_root(repository, root);
    }
}

impl ComputedRootEvaluator for Evaluator {
    /// Resolves a `Computed` repository root by fully evaluating the named
    /// target it points at, then materialising that target's default
    /// artifact into a real tree. Runs on a wholly separate, ephemeral
    /// `AsyncMap`/pool rather than this evaluator's own: `AsyncMap::run`
    /// blocks its caller, and this method is reachable from inside
    /// `Shared::resolve_root`, which itself can run on this evaluator's
    /// pool — recursing into the same pool here would risk deadlock on a
    /// small pool.
    fn evaluate(
        &self,
        repository: &str,
        target_module: &str,
        target_name: &str,
        config: &Value,
    ) -> forge_resolve::error::ResolveResult<String> {
        evaluate_computed_root(&self.shared, self.jobs.max(1), repository, target_module, target_name, config)
            .map_err(|e| forge_resolve::error::ResolveError::PrecomputedRoot(e.to_string()))
    }
}

fn evaluate_computed_root(
    shared: &Arc<Shared>,
    jobs: usize,
    repository: &str,
    target_module: &str,
    target_name: &str,
    config: &Value,
) -> EvalResult<String> {
    let nested_shared = Arc::new(Shared {
        repo: shared.repo.clone(),
        repositories: shared.repositories.clone(),
        materializer: Arc::clone(&shared.materializer),
        target_file_source: shared.target_file_source.clone(),
        roots: Mutex::new(shared.roots.lock().expect("root cache mutex poisoned").clone()),
        configs: Mutex::new(HashMap::new()),
    });
    let map = build_map(Arc::clone(&nested_shared), jobs).map_err(|e| EvalError::Other(e.to_string()))?;

    let target = NamedTarget::new(repository, target_module, target_name, ReferenceType::Target);
    let effective = econfig::effective_config(&Value::Null, config);
    let key = AnalysisKey::new(EntityName::Named(target.clone()), &effective);
    nested_shared.record_config(key.effective_config_hash.clone(), effective);
    let evaluated = map.run(vec![key]).remove(0)?;
    let artifact = evaluated.default_artifact().ok_or_else(|| EvalError::InvalidTarget {
        target: target.to_string(),
        message: "computed root target produced no single default artifact".to_string(),
    })?;
    materialize_artifact_as_tree(shared, evaluated.analysis.actions.as_slice(), artifact)
}

fn artifact_object_type(artifact: &ArtifactDescription) -> EvalResult<ObjectType> {
    match artifact {
        ArtifactDescription::Tree { .. } => Ok(ObjectType::Tree),
        ArtifactDescription::Known { object_type, .. } => Ok(*object_type),
        ArtifactDescription::Local { .. } => Ok(ObjectType::File),
        ArtifactDescription::Action { .. } => Err(EvalError::Other(
            "computed-root materialisation cannot resolve an action output without the execution bridge".to_string(),
        )),
    }
}

/// Turns a `Tree`-valued artifact into a real git tree written into the
/// shared ODB, recursing into nested trees and resolving file-shaped leaves
/// via [`materialize_artifact_as_blob`]. Only reachable for trees whose
/// leaves are themselves `Local`/`Known`/`Tree` artifacts; an `Action`
/// output anywhere in the tree fails loudly rather than silently producing
/// a wrong (empty) entry, since actually running that action is the
/// execution bridge's job (C8), not this crate's.
fn materialize_artifact_as_tree(
    shared: &Shared,
    actions: &[forge_model::ActionDescription],
    artifact: &ArtifactDescription,
) -> EvalResult<String> {
    let ArtifactDescription::Tree { tree_id } = artifact else {
        return Err(EvalError::Other(
            "a computed root must resolve to a Tree artifact".to_string(),
        ));
    };
    let action = actions
        .iter()
        .find(|a| a.is_tree_action() && a.id() == tree_id)
        .ok_or_else(|| {
            EvalError::Other(format!(
                "no tree action found for tree {tree_id:?} among the producing target's own actions"
            ))
        })?;

    let mut entries = Vec::with_capacity(action.inputs().len());
    for (path, input) in action.inputs() {
        let object_type = artifact_object_type(input)?;
        let id = if object_type == ObjectType::Tree {
            materialize_artifact_as_tree(shared, actions, input)?
        } else {
            materialize_artifact_as_blob(shared, input)?
        };
        entries.push(GitTreeEntry {
            name: path.clone(),
            id,
            object_type,
        });
    }
    shared.repo.create_tree(&entries).map_err(|e| EvalError::Other(e.to_string()))
}

fn materialize_artifact_as_blob(shared: &Shared, artifact: &ArtifactDescription) -> EvalResult<String> {
    match artifact {
        ArtifactDescription::Local { path, repository } => {
            let root = shared.resolve_root(repository)?;
            let WorkspaceRoot::Present(tree_id) = root else {
                return Err(EvalError::Other(format!(
                    "repository {repository:?} has no local content to read {path:?} from"
                )));
            };
            let (dir, file_name) = match path.rsplit_once('/') {
                Some((dir, file)) => (dir, file),
                None => ("", path.as_str()),
            };
            let dir_tree_id = shared
                .repo
                .get_subtree_from_tree(&tree_id, dir)
                .map_err(|e| EvalError::Other(e.to_string()))?
                .ok_or_else(|| EvalError::Other(format!("path {path:?} not found in repository {repository:?}")))?;
            let entries = shared
                .repo
                .read_tree(&dir_tree_id)
                .map_err(|e| EvalError::Other(e.to_string()))?;
            entries
                .into_iter()
                .find(|e| e.name == file_name)
                .map(|e| e.id)
                .ok_or_else(|| EvalError::Other(format!("path {path:?} not found in repository {repository:?}")))
        }
        ArtifactDescription::Known { digest, .. } => {
            if shared.repo.check_exists(digest.hex()).unwrap_or(false) {
                Ok(digest.hex().to_string())
            } else {
                Err(EvalError::Other(format!(
                    "known artifact {} is not present in the local git object database; fetching it requires the content cache",
                    digest.hex()
                )))
            }
        }
        ArtifactDescription::Tree { .. } => {
            unreachable!("artifact_object_type routes Tree artifacts to materialize_artifact_as_tree")
        }
        ArtifactDescription::Action { .. } => Err(EvalError::Other(
            "computed-root materialisation cannot resolve an action output without the execution bridge".to_string(),
        )),
    }
}
