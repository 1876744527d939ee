//! Derive macros for Lattice config trees.
//!
//! `#[derive(Config)]` generates the structural `ConfigNode` impl for a
//! record type: tag-keyed serialization, flattening, dotted-path descent
//! and the post-order visitor. Attributes:
//!
//! - `#[config(root = "name")]` on the struct: also implement the
//!   `Config` root capability with that name.
//! - `#[config(validate)]` on the struct: forward node validation to the
//!   type's `Validatable` impl.
//! - `#[config(topic)]` on the struct: forward change notification to the
//!   type's `Registrable` impl.
//! - `#[config(rename = "tag")]` on a field: dotted-path segment for the
//!   field (defaults to the field name).
//! - `#[config(skip)]` on a field: exclude the field from flattening,
//!   lookup and assignment.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, LitStr};

#[proc_macro_derive(Config, attributes(config))]
pub fn derive_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct StructOpts {
    root: Option<LitStr>,
    validate: bool,
    topic: bool,
}

struct FieldSpec {
    ident: Ident,
    tag: LitStr,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let opts = struct_opts(&input)?;
    let fields = field_specs(&input)?;

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let idents: Vec<&Ident> = fields.iter().map(|f| &f.ident).collect();
    let tags: Vec<&LitStr> = fields.iter().map(|f| &f.tag).collect();

    let validate_node = opts.validate.then(|| {
        quote! {
            fn validate_node(&self) -> ::lattice_config::__private::anyhow::Result<()> {
                ::lattice_config::Validatable::validate(self)
            }
        }
    });

    let topic_fns = opts.topic.then(|| {
        quote! {
            fn topic(&self) -> ::std::option::Option<::lattice_config::Topic> {
                ::std::option::Option::Some(::lattice_config::Registrable::topic(self))
            }

            fn payload(&self) -> ::std::option::Option<::lattice_config::ConfigPayload> {
                ::std::option::Option::Some(
                    ::lattice_config::__private::Arc::new(::std::clone::Clone::clone(self))
                        as ::lattice_config::ConfigPayload,
                )
            }
        }
    });

    let root_impl = opts.root.as_ref().map(|root| {
        quote! {
            impl #impl_generics ::lattice_config::Config for #name #ty_generics #where_clause {
                fn name(&self) -> &str {
                    #root
                }
            }
        }
    });

    let expected = name.to_string();

    Ok(quote! {
        impl #impl_generics ::lattice_config::ConfigNode for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::lattice_config::__private::Value {
                let mut object = ::lattice_config::__private::Map::new();
                #(
                    object.insert(
                        #tags.to_string(),
                        ::lattice_config::ConfigNode::to_value(&self.#idents),
                    );
                )*
                ::lattice_config::__private::Value::Object(object)
            }

            fn flatten_into(
                &self,
                prefix: &str,
                out: &mut ::lattice_config::__private::BTreeMap<
                    ::std::string::String,
                    ::lattice_config::__private::Value,
                >,
            ) {
                #(
                    ::lattice_config::ConfigNode::flatten_into(
                        &self.#idents,
                        &::lattice_config::paths::join(prefix, #tags),
                        out,
                    );
                )*
            }

            fn assign(
                &mut self,
                value: &::lattice_config::__private::Value,
                path: &str,
            ) -> ::std::result::Result<(), ::lattice_config::ConfigError> {
                let ::std::option::Option::Some(object) = value.as_object() else {
                    return ::std::result::Result::Err(
                        ::lattice_config::ConfigError::type_mismatch(path, #expected, value),
                    );
                };
                for (key, child) in object {
                    let child_path = ::lattice_config::paths::join(path, key);
                    match key.as_str() {
                        #(
                            #tags => ::lattice_config::ConfigNode::assign(
                                &mut self.#idents,
                                child,
                                &child_path,
                            )?,
                        )*
                        _ => {
                            return ::std::result::Result::Err(
                                ::lattice_config::ConfigError::no_such_field(&child_path),
                            )
                        }
                    }
                }
                ::std::result::Result::Ok(())
            }

            fn enter(
                &mut self,
                segment: &str,
                child_path: &str,
                _journal: &mut ::lattice_config::RollbackJournal,
            ) -> ::std::result::Result<&mut dyn ::lattice_config::ConfigNode, ::lattice_config::ConfigError>
            {
                match segment {
                    #(
                        #tags => ::std::result::Result::Ok(
                            &mut self.#idents as &mut dyn ::lattice_config::ConfigNode,
                        ),
                    )*
                    _ => ::std::result::Result::Err(
                        ::lattice_config::ConfigError::no_such_field(child_path),
                    ),
                }
            }

            fn lookup(&mut self, segment: &str) -> ::std::option::Option<&mut dyn ::lattice_config::ConfigNode> {
                match segment {
                    #(
                        #tags => ::std::option::Option::Some(
                            &mut self.#idents as &mut dyn ::lattice_config::ConfigNode,
                        ),
                    )*
                    _ => ::std::option::Option::None,
                }
            }

            fn visit(
                &self,
                path: &str,
                f: &mut dyn FnMut(&str, &dyn ::lattice_config::ConfigNode)
                    -> ::std::result::Result<(), ::lattice_config::ConfigError>,
            ) -> ::std::result::Result<(), ::lattice_config::ConfigError> {
                #(
                    ::lattice_config::ConfigNode::visit(
                        &self.#idents,
                        &::lattice_config::paths::join(path, #tags),
                        f,
                    )?;
                )*
                f(path, self)
            }

            #validate_node
            #topic_fns
        }

        #root_impl
    })
}

fn struct_opts(input: &DeriveInput) -> syn::Result<StructOpts> {
    let mut opts = StructOpts {
        root: None,
        validate: false,
        topic: false,
    };
    for attr in &input.attrs {
        if !attr.path().is_ident("config") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("root") {
                opts.root = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("validate") {
                opts.validate = true;
                Ok(())
            } else if meta.path.is_ident("topic") {
                opts.topic = true;
                Ok(())
            } else {
                Err(meta.error("unsupported config attribute"))
            }
        })?;
    }
    Ok(opts)
}

fn field_specs(input: &DeriveInput) -> syn::Result<Vec<FieldSpec>> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Config can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "Config requires named fields",
        ));
    };

    let mut specs = Vec::new();
    for field in &fields.named {
        let mut rename: Option<LitStr> = None;
        let mut skip = false;
        for attr in &field.attrs {
            if !attr.path().is_ident("config") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    rename = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported config attribute"))
                }
            })?;
        }
        if skip {
            continue;
        }
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let tag =
            rename.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
        specs.push(FieldSpec { ident, tag });
    }
    Ok(specs)
}
