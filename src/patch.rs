//! Routes `LabelObject.SetText` through `KRHook.OnSetText` in the game's managed assembly.
//!
//! The first `ldarg.1` of `SetText` becomes `ldarg.0; ldarg.1; call KRHook.OnSetText`,
//! so the hook sees the label and the text and returns the text to display.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, ensure};
use dotscope::metadata::tables::{
    AssemblyRefRaw, CodedIndex, CodedIndexType, MethodDefRaw, TableDataOwned, TableId, TypeDefRaw,
};
use dotscope::prelude::*;

pub mod il;

use il::MethodBody;

pub const ASSEMBLY_FILE: &str = "Assembly-CSharp.dll";
pub const HOOK_FILE: &str = "KRHook.dll";

const HOOK_ASSEMBLY: &str = "KRHook";
const HOOK_TYPE: &str = "KRHook";
const HOOK_METHOD: &str = "OnSetText";
const TARGET_TYPE: &str = "LabelObject";
const TARGET_METHOD: &str = "SetText";

/// The assembly to patch and the hook assembly next to it.
#[derive(Debug, Clone)]
pub struct PatchTarget {
    pub assembly: PathBuf,
    pub hook: PathBuf,
}

impl PatchTarget {
    /// Both files are expected in `<game>/HuniePop_Data/Managed`.
    pub fn in_game_dir(game_dir: &Path) -> Result<PatchTarget> {
        let managed = game_dir.join("HuniePop_Data").join("Managed");
        let target = PatchTarget {
            assembly: managed.join(ASSEMBLY_FILE),
            hook: managed.join(HOOK_FILE),
        };
        ensure!(
            target.assembly.is_file(),
            "{ASSEMBLY_FILE} not found in '{}'",
            managed.display()
        );
        ensure!(
            target.hook.is_file(),
            "{HOOK_FILE} not found in '{}' (copy it first)",
            managed.display()
        );
        Ok(target)
    }

    /// `Assembly-CSharp.dll.bak` next to the assembly.
    pub fn backup(&self) -> PathBuf {
        let mut backup = self.assembly.clone().into_os_string();
        backup.push(".bak");
        PathBuf::from(backup)
    }
}

#[derive(Debug)]
pub struct Patched {
    /// `false` if a backup from an earlier run was kept.
    pub backup_created: bool,
}

struct TypeMethods {
    namespace: String,
    methods: Vec<MethodDefRaw>,
}

fn string(view: &CilAssemblyView, index: u32) -> Result<String> {
    let strings = view.strings().context("assembly has no #Strings heap")?;
    Ok(strings.get(index as usize)?.to_owned())
}

fn blob(view: &CilAssemblyView, index: u32) -> Result<Vec<u8>> {
    let blobs = view.blobs().context("assembly has no #Blob heap")?;
    Ok(blobs.get(index as usize)?.to_vec())
}

/// Rows of the method table owned by a type. `method_list` is a 1-based row index,
/// the list runs until the next type's list or the end of the table.
fn method_rows(method_list: u32, next: Option<u32>, method_count: usize) -> Range<usize> {
    let start = (method_list as usize).saturating_sub(1).min(method_count);
    let end = next.map_or(method_count, |next| (next as usize).saturating_sub(1).min(method_count));
    start..end.max(start)
}

fn find_type(view: &CilAssemblyView, name: &str) -> Result<Option<TypeMethods>> {
    let tables = view.tables().context("assembly has no metadata tables")?;
    let types: Vec<TypeDefRaw> = tables
        .table::<TypeDefRaw>()
        .map(|table| table.iter().collect())
        .unwrap_or_default();
    let methods: Vec<MethodDefRaw> = tables
        .table::<MethodDefRaw>()
        .map(|table| table.iter().collect())
        .unwrap_or_default();

    for (i, ty) in types.iter().enumerate() {
        if string(view, ty.type_name)? != name {
            continue;
        }
        let next = types.get(i + 1).map(|next| next.method_list);
        let rows = method_rows(ty.method_list, next, methods.len());
        return Ok(Some(TypeMethods {
            namespace: string(view, ty.type_namespace)?,
            methods: methods[rows].to_vec(),
        }));
    }
    Ok(None)
}

/// The first method called `name`, with its signature blob.
fn find_method(
    view: &CilAssemblyView,
    methods: &[MethodDefRaw],
    name: &str,
    param_count: Option<u32>,
) -> Result<Option<(MethodDefRaw, Vec<u8>)>> {
    for method in methods {
        if string(view, method.name)? != name {
            continue;
        }
        let signature = blob(view, method.signature)?;
        if param_count.is_some_and(|count| il::param_count(&signature) != Some(count)) {
            continue;
        }
        return Ok(Some((method.clone(), signature)));
    }
    Ok(None)
}

fn method_body(view: &CilAssemblyView, method: &MethodDefRaw) -> Result<MethodBody> {
    ensure!(method.rva != 0, "method has no IL body");
    let file = view.file();
    let offset = file.rva_to_offset(method.rva as usize)?;
    let data = file
        .data()
        .get(offset..)
        .context("method body lies outside of the file")?;
    MethodBody::parse(data)
}

fn assembly_ref(view: &CilAssemblyView, name: &str) -> Result<Option<u32>> {
    let Some(table) = view
        .tables()
        .and_then(|tables| tables.table::<AssemblyRefRaw>())
    else {
        return Ok(None);
    };
    for row in table.iter() {
        if string(view, row.name)? == name {
            return Ok(Some(row.rid));
        }
    }
    Ok(None)
}

/// Patches the assembly in place. The original is renamed to `.bak` unless a backup exists.
pub fn patch(target: &PatchTarget) -> Result<Patched> {
    let hook_view = CilAssemblyView::from_path(&target.hook)
        .with_context(|| format!("Could not load '{}'", target.hook.display()))?;
    let hook_type = find_type(&hook_view, HOOK_TYPE)?
        .with_context(|| format!("{HOOK_TYPE} type not found in {HOOK_FILE}"))?;
    let (_, hook_signature) = find_method(&hook_view, &hook_type.methods, HOOK_METHOD, None)?
        .with_context(|| format!("{HOOK_TYPE}.{HOOK_METHOD} not found"))?;
    tracing::debug!(
        "Found {HOOK_TYPE}.{HOOK_METHOD} with {:?} parameters",
        il::param_count(&hook_signature)
    );

    tracing::info!("Loading {}", target.assembly.display());
    let view = CilAssemblyView::from_path(&target.assembly)
        .with_context(|| format!("Could not load '{}'", target.assembly.display()))?;
    let label = find_type(&view, TARGET_TYPE)?
        .with_context(|| format!("{TARGET_TYPE} not found"))?;
    let (set_text, _) = find_method(&view, &label.methods, TARGET_METHOD, Some(1))?
        .with_context(|| format!("{TARGET_TYPE}.{TARGET_METHOD} not found"))?;
    let mut body = method_body(&view, &set_text)
        .with_context(|| format!("Could not read the body of {TARGET_TYPE}.{TARGET_METHOD}"))?;
    let existing_ref = assembly_ref(&view, HOOK_ASSEMBLY)?;

    let mut assembly = CilAssembly::new(view);
    let scope = match existing_ref {
        Some(rid) => rid,
        None => {
            let reference = AssemblyRefBuilder::new()
                .name(HOOK_ASSEMBLY)
                .version(0, 0, 0, 0)
                .build(&mut assembly)?;
            tracing::info!("Added {HOOK_ASSEMBLY} reference");
            reference.placeholder()
        }
    };
    let hook_type_ref = TypeRefBuilder::new()
        .name(HOOK_TYPE)
        .namespace(&hook_type.namespace)
        .resolution_scope(CodedIndex::new(
            TableId::AssemblyRef,
            scope,
            CodedIndexType::ResolutionScope,
        ))
        .build(&mut assembly)?;
    let hook_ref = MemberRefBuilder::new()
        .name(HOOK_METHOD)
        .class(CodedIndex::new(
            TableId::TypeRef,
            hook_type_ref.placeholder(),
            CodedIndexType::MemberRefParent,
        ))
        .signature(&hook_signature)
        .build(&mut assembly)?;
    let hook_token = hook_ref
        .placeholder_token()
        .with_context(|| format!("{HOOK_TYPE}.{HOOK_METHOD} reference has no token"))?;

    body.splice_hook(hook_token.value())
        .context("Failed to patch IL")?;

    let mut row = set_text;
    row.rva = assembly.store_method_body(body.encode());
    let rid = row.rid;
    assembly.table_row_update(TableId::MethodDef, rid, TableDataOwned::MethodDef(row))?;

    let mut staged = target.assembly.clone().into_os_string();
    staged.push(".patched");
    let staged = PathBuf::from(staged);
    assembly
        .to_file(&staged)
        .with_context(|| format!("Could not write '{}'", staged.display()))?;

    let backup = target.backup();
    let backup_created = !backup.exists();
    if backup_created {
        fs::rename(&target.assembly, &backup)
            .with_context(|| format!("Could not create backup '{}'", backup.display()))?;
        tracing::info!("Backup created at {}", backup.display());
    }
    fs::rename(&staged, &target.assembly)
        .with_context(|| format!("Could not replace '{}'", target.assembly.display()))?;

    Ok(Patched { backup_created })
}
