use std::rc::Rc;

use trellis_di::{
    BindingId, ContainerGraph, ContainerId, FactoryInstantiator, InstallError, Installer,
    TypeInfo,
};

struct Settings {
    volume: f32,
}

trait AudioPlayer {
    fn play(&self, clip: &str) -> String;
}
trait EventSink {
    fn notify(&self, event: &str) -> String;
}

struct SoundSystem {
    settings: Rc<Settings>,
}
impl AudioPlayer for SoundSystem {
    fn play(&self, clip: &str) -> String {
        format!("playing '{clip}' at volume {}", self.settings.volume)
    }
}
impl EventSink for SoundSystem {
    fn notify(&self, event: &str) -> String {
        format!("sound for event '{event}'")
    }
}

struct LevelInstaller;
impl Installer for LevelInstaller {
    fn installer_type(&self) -> TypeInfo {
        TypeInfo::of::<LevelInstaller>()
    }

    fn install(
        &self,
        graph: &mut ContainerGraph,
        container: ContainerId,
    ) -> Result<(), InstallError> {
        graph
            .bind::<String>(container)
            .from_instance("crypt of the ancients".to_string());
        Ok(())
    }
}

fn main() {
    let mut instantiator = FactoryInstantiator::new();
    instantiator.register::<SoundSystem, _>(|graph, container, _, _| {
        let settings = graph.resolve_type::<Settings>(container)?;
        Ok(SoundSystem { settings })
    });
    instantiator.allow_upcast(
        TypeInfo::of::<dyn AudioPlayer>(),
        TypeInfo::of::<SoundSystem>(),
    );
    instantiator.allow_upcast(
        TypeInfo::of::<dyn EventSink>(),
        TypeInfo::of::<SoundSystem>(),
    );

    let mut graph = ContainerGraph::new(Rc::new(instantiator));
    let root = graph.new_root();

    graph
        .bind::<Settings>(root)
        .from_instance(Settings { volume: 0.8 });

    // Both contracts resolve to the very same SoundSystem instance
    graph
        .bind::<dyn AudioPlayer>(root)
        .to::<SoundSystem>()
        .as_singleton();
    graph
        .bind::<dyn EventSink>(root)
        .to::<SoundSystem>()
        .as_singleton();

    // The level name lives in a nested container installed on first use
    graph
        .bind::<String>(root)
        .as_singleton()
        .from_sub_container_installer(Rc::new(LevelInstaller));

    if let Err(error) = graph.install(root) {
        eprintln!("install failed: {error}");
        return;
    }

    let audio = graph
        .resolve(root, &BindingId::of::<dyn AudioPlayer>())
        .and_then(|instance| {
            instance
                .downcast::<SoundSystem>()
                .map_err(|actual| trellis_di::ResolveError::Downcast {
                    required: "SoundSystem",
                    actual,
                })
        });

    match audio {
        Ok(sound) => println!("{}", sound.play("door_creak")),
        Err(error) => eprintln!("resolve failed: {error}"),
    }

    match graph.resolve_type::<String>(root) {
        Ok(level) => println!("entering level: {level}"),
        Err(error) => eprintln!("resolve failed: {error}"),
    }
}
