//! CLI dry run of the host protocol.
//!
//! # Responsibility
//! - Drive activate / contribute / describe / invoke against in-memory
//!   menus so the contract can be checked without a desktop shell.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `sortbyschlong_cli [submenu|flat|inject:<label>] [offset]`

use sortbyschlong_core::menu::MemoryMenuItem;
use sortbyschlong_core::{
    core_version, ActivationContext, ClassFactory, CommandCatalog, CommandStringKind,
    ContributeRequest, ExtensionEnv, Initializable, InvocationRequest, MemoryMenuBackend,
    MenuContributor, MenuHandle, MenuStrategy, ModuleCounters, RecordingLauncher, TextBuffer,
};
use std::process::ExitCode;
use std::sync::Arc;

static COUNTERS: ModuleCounters = ModuleCounters::new();

const ID_FIRST: u32 = 1;
const ID_LAST: u32 = 0x7FFF;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let strategy = match args.next().map(|value| value.parse::<MenuStrategy>()) {
        None => MenuStrategy::default(),
        Some(Ok(strategy)) => strategy,
        Some(Err(err)) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let offset = match args.next().map(|value| value.parse::<u32>()) {
        None => 0,
        Some(Ok(offset)) => offset,
        Some(Err(err)) => {
            eprintln!("error: invalid offset: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("sortbyschlong_core version={}", core_version());
    println!("strategy={}", strategy.as_str());

    let backend = Arc::new(MemoryMenuBackend::new());
    let launcher = Arc::new(RecordingLauncher::new(true));
    let host_menu = backend.create_host_menu();
    if let MenuStrategy::InjectInto { label } = &strategy {
        // Stand-in for the popup the desktop shell normally provides.
        if let Err(err) = backend.add_host_popup(host_menu, label) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    }

    let env = ExtensionEnv::new(
        Arc::new(CommandCatalog::builtin().clone()),
        backend.clone(),
        launcher.clone(),
    )
    .with_strategy(strategy);
    let factory = ClassFactory::new(&COUNTERS, Arc::new(env));
    let instance = match factory.create_instance() {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = instance.activate(ActivationContext::desktop_background()) {
        eprintln!("error: activate failed: {err}");
        return ExitCode::FAILURE;
    }
    let consumed = instance.contribute_menu(ContributeRequest {
        menu: host_menu,
        insertion_hint: 0,
        id_first: ID_FIRST,
        id_last: ID_LAST,
        flags: 0,
    });
    println!("contributed ids={consumed}");
    print_menu(&backend, host_menu, 0);

    for id in ID_FIRST..ID_FIRST + consumed {
        let verb = describe(&*instance, id, CommandStringKind::VerbWide);
        let help = describe(&*instance, id, CommandStringKind::HelpWide);
        if let (Some(verb), Some(help)) = (verb, help) {
            println!("id={id} verb={verb} help=\"{help}\"");
        }
    }

    match instance.invoke(&InvocationRequest::Index(offset)) {
        Ok(()) => println!("invoke offset={offset} launched={:?}", launcher.launched()),
        Err(err) => println!("invoke offset={offset} error={err}"),
    }

    drop(instance);
    println!("can_unload={}", COUNTERS.can_unload());
    ExitCode::SUCCESS
}

fn describe(instance: &dyn MenuContributor, id: u32, kind: CommandStringKind) -> Option<String> {
    let mut units = [0_u16; 260];
    let written = instance
        .describe_command(id, kind, &mut TextBuffer::Wide(&mut units))
        .ok()?;
    Some(String::from_utf16_lossy(&units[..written]))
}

fn print_menu(backend: &MemoryMenuBackend, menu: MenuHandle, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    for item in backend.items(menu) {
        match item {
            MemoryMenuItem::Command { id, text } => println!("{indent}[{id}] {text}"),
            MemoryMenuItem::Popup { text, menu } => {
                println!("{indent}{text} >");
                print_menu(backend, menu, depth + 1);
            }
        }
    }
}
