use kube::core::CustomResourceExt;
use runtime_operator::crd::kogito_runtime::KogitoRuntime;

fn main() {
    let crd = KogitoRuntime::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
